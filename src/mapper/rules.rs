//! Field rules, each returning the transformations it applied

use crate::models::{Attribute, Transformation};
use serde_json::{Map, Value};

/// First `max` characters, and whether anything was cut
pub fn truncate_chars(value: &str, max: usize) -> (String, bool) {
    if value.chars().count() <= max {
        (value.to_string(), false)
    } else {
        (value.chars().take(max).collect(), true)
    }
}

pub fn name(raw: &str, token_id: &str, max: usize) -> (String, Vec<Transformation>) {
    let mut log = Vec::new();
    let mut name = raw.trim().to_string();

    if name.is_empty() {
        name = format!("Migrated NFT #{}", token_id);
        log.push(Transformation::new("name", raw, name.clone(), "empty name synthesized"));
    }

    let (truncated, cut) = truncate_chars(&name, max);
    if cut {
        log.push(Transformation::new(
            "name",
            name.clone(),
            truncated.clone(),
            format!("truncated to {} characters", max),
        ));
    }

    (truncated, log)
}

pub fn description(raw: &str, default: &str, max: usize) -> (String, Vec<Transformation>) {
    let mut log = Vec::new();
    let mut description = raw.trim().to_string();

    if description.is_empty() {
        description = default.to_string();
        log.push(Transformation::new(
            "description",
            raw,
            description.clone(),
            "empty description replaced with default",
        ));
    }

    if description.chars().count() > max {
        let keep = max.saturating_sub(3);
        let truncated = format!("{}...", description.chars().take(keep).collect::<String>());
        log.push(Transformation::new(
            "description",
            description.clone(),
            truncated.clone(),
            format!("truncated to {} characters", max),
        ));
        description = truncated;
    }

    (description, log)
}

/// Rewrite a content-addressed uri through its gateway
pub fn uri(
    field: &str,
    raw: &str,
    rewrite: impl Fn(&str) -> Option<String>,
) -> (String, Vec<Transformation>) {
    let raw = raw.trim();
    match rewrite(raw) {
        Some(url) => {
            let log = vec![Transformation::new(field, raw, url.clone(), "content uri rewritten to gateway")];
            (url, log)
        }
        None => (raw.to_string(), Vec::new()),
    }
}

/// Normalize attribute keys (`name` -> `trait_type`, `val` -> `value`), keeping unknown keys
pub fn attributes(raw: &[Value]) -> (Vec<Attribute>, Vec<Transformation>) {
    let mut log = Vec::new();
    let mut attributes = Vec::with_capacity(raw.len());

    for (index, entry) in raw.iter().enumerate() {
        let field = format!("attributes[{}]", index);
        match entry {
            Value::Object(map) => {
                let (attribute, renamed) = normalize_object(map);
                for (from, to) in renamed {
                    log.push(Transformation::new(
                        field.clone(),
                        from,
                        to,
                        "attribute key normalized",
                    ));
                }
                attributes.push(attribute);
            }
            Value::Null => {
                log.push(Transformation::new(field, Value::Null, Value::Null, "null attribute dropped"));
            }
            scalar => {
                let attribute = Attribute::new(format!("Trait {}", index + 1), scalar.clone());
                log.push(Transformation::new(
                    field,
                    scalar.clone(),
                    attribute.trait_type.clone(),
                    "bare value wrapped as attribute",
                ));
                attributes.push(attribute);
            }
        }
    }

    (attributes, log)
}

fn normalize_object(map: &Map<String, Value>) -> (Attribute, Vec<(&'static str, &'static str)>) {
    let mut renamed = Vec::new();

    let trait_type = match (map.get("trait_type"), map.get("name")) {
        (Some(t), _) => Some(("trait_type", t)),
        (None, Some(n)) => {
            renamed.push(("name", "trait_type"));
            Some(("name", n))
        }
        (None, None) => None,
    };
    let value = match (map.get("value"), map.get("val")) {
        (Some(v), _) => Some(("value", v)),
        (None, Some(v)) => {
            renamed.push(("val", "value"));
            Some(("val", v))
        }
        (None, None) => None,
    };

    let consumed: Vec<&str> = [trait_type.map(|(k, _)| k), value.map(|(k, _)| k)]
        .into_iter()
        .flatten()
        .collect();

    let mut attribute = Attribute::new(
        trait_type.map(|(_, v)| text(v)).unwrap_or_default(),
        value.map(|(_, v)| v.clone()).unwrap_or(Value::Null),
    );

    for (key, value) in map {
        if consumed.contains(&key.as_str()) {
            continue;
        }
        if key == "display_type" {
            attribute.display_type = value.as_str().map(str::to_string);
        } else {
            attribute.extra.push((key.clone(), value.clone()));
        }
    }

    (attribute, renamed)
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Explicit symbol, else initials of the first three words, else the default
pub fn symbol(
    explicit: Option<&str>,
    name: &str,
    default: &str,
    max: usize,
) -> (String, Vec<Transformation>) {
    let mut log = Vec::new();

    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        let (symbol, cut) = truncate_chars(explicit, max);
        if cut {
            log.push(Transformation::new(
                "symbol",
                explicit,
                symbol.clone(),
                format!("truncated to {} characters", max),
            ));
        }
        return (symbol, log);
    }

    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(3)
        .flat_map(char::to_uppercase)
        .collect();

    let (symbol, reason) = if initials.chars().count() >= 2 {
        (truncate_chars(&initials, max).0, "derived from name initials")
    } else {
        (truncate_chars(default, max).0, "default symbol")
    };
    log.push(Transformation::new("symbol", Value::Null, symbol.clone(), reason));

    (symbol, log)
}

/// Best-effort MIME type from the uri extension
pub fn mime_type(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri).to_ascii_lowercase();
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        _ => "image/png",
    }
}
