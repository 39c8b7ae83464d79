use super::record::SourceRecord;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Target-schema attribute
///
/// `extra` keeps keys the mapper did not recognize, in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub trait_type: String,
    pub value: Value,
    pub display_type: Option<String>,
    pub extra: Vec<(String, Value)>,
}

impl Attribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
            display_type: None,
            extra: Vec::new(),
        }
    }

    fn from_object(map: Map<String, Value>) -> Self {
        let mut attribute = Attribute::new(String::new(), Value::Null);
        for (key, value) in map {
            match key.as_str() {
                "trait_type" => {
                    attribute.trait_type = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
                }
                "value" => attribute.value = value,
                "display_type" => attribute.display_type = value.as_str().map(str::to_string),
                _ => attribute.extra.push((key, value)),
            }
        }
        attribute
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.display_type.is_some()) + self.extra.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("trait_type", &self.trait_type)?;
        map.serialize_entry("value", &self.value)?;
        if let Some(display_type) = &self.display_type {
            map.serialize_entry("display_type", display_type)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Ok(Attribute::from_object(map)),
            other => Err(de::Error::custom(format!("attribute must be an object, got {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub uri: String,
    #[serde(rename = "type")]
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub category: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            category: "image".to_string(),
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub family: String,
}

/// Off-chain metadata document for a compressed NFT
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub seller_fee_basis_points: u16,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionInfo>,
}

impl TargetMetadata {
    pub fn attribute(&self, trait_type: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.trait_type == trait_type)
    }
}

/// Metadata template chosen by the mapper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Generic,
    CarbonCredit,
}

/// One logged field change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub field: String,
    pub before: Value,
    pub after: Value,
    pub reason: String,
}

impl Transformation {
    pub fn new(
        field: impl Into<String>,
        before: impl Into<Value>,
        after: impl Into<Value>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            before: before.into(),
            after: after.into(),
            reason: reason.into(),
        }
    }
}

/// Result of mapping one source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub source: SourceRecord,
    pub target: TargetMetadata,
    pub template: Template,
    pub transformations: Vec<Transformation>,
    pub warnings: Vec<String>,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Mapping {
    pub fn new(source: SourceRecord) -> Self {
        Self {
            source,
            target: TargetMetadata::default(),
            template: Template::Generic,
            transformations: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, transformation: Transformation) {
        self.transformations.push(transformation);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    pub fn transformations_for(&self, field: &str) -> impl Iterator<Item = &Transformation> {
        self.transformations.iter().filter(move |t| t.field == field)
    }
}
