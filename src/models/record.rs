use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// One token as exported from the source contract
///
/// Attributes are kept exactly as the source metadata declared them; the
/// mapper normalizes their keys. Immutable after [`SourceRecord::sealed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_contract: String,
    pub source_token_id: String,
    pub owner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_uri: String,
    #[serde(default)]
    pub external_uri: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Value>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub collection_symbol: Option<String>,
    #[serde(default)]
    pub raw_metadata: Value,
    #[serde(default)]
    pub content_hash: String,
}

impl SourceRecord {
    /// `<contract>:<token_id>`
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_contract, self.source_token_id)
    }

    /// Fields covered by the content hash
    fn identity(&self) -> Value {
        let mut map = Map::new();
        map.insert("source_contract".into(), self.source_contract.clone().into());
        map.insert("source_token_id".into(), self.source_token_id.clone().into());
        map.insert("owner".into(), self.owner.clone().into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("description".into(), self.description.clone().into());
        map.insert("image_uri".into(), self.image_uri.clone().into());
        map.insert(
            "external_uri".into(),
            self.external_uri.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert("attributes".into(), Value::Array(self.attributes.clone()));
        Value::Object(map)
    }

    /// SHA-256 (hex) of the canonical serialization of the identifying fields
    pub fn compute_hash(&self) -> String {
        let digest = Sha256::digest(canonical_json(&self.identity()).as_bytes());
        hex::encode(digest)
    }

    /// Stamp the content hash; called once by the exporter
    pub fn sealed(mut self) -> Self {
        self.content_hash = self.compute_hash();
        self
    }

    pub fn verify_hash(&self) -> bool {
        !self.content_hash.is_empty() && self.content_hash == self.compute_hash()
    }
}

/// Deterministic JSON: object keys sorted at every level, no whitespace
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    let _ = write!(out, "{}", Value::String(s.to_string()));
}
