//! Carbon-credit detection and metadata template

use crate::models::{Attribute, SourceRecord, Transformation};
use serde_json::Value;

const CARBON_KEYWORDS: &[&str] = &["carbon", "offset", "credit", "tree", "forest", "environmental"];

/// Attribute names that only appear on carbon-credit collections
const CARBON_ATTRIBUTES: &[&str] = &[
    "treeid",
    "species",
    "location",
    "plantingdate",
    "carbonoffset",
    "co2offset",
    "co2",
    "sequestration",
];

/// Standard carbon-credit attributes, in output order
const STANDARD_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("Tree ID", &["treeid", "id"]),
    ("Species", &["species", "treespecies"]),
    ("Location", &["location", "region", "coordinates"]),
    ("Planting Date", &["plantingdate", "planted", "plantedon"]),
    ("Carbon Offset", &["carbonoffset", "co2offset", "co2", "offset"]),
];

fn key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn contains_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    CARBON_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Keyword scan over name, description and attribute values, plus known attribute names
pub fn is_carbon_credit(record: &SourceRecord, attributes: &[Attribute]) -> bool {
    if contains_keyword(&record.name) || contains_keyword(&record.description) {
        return true;
    }

    attributes.iter().any(|attribute| {
        CARBON_ATTRIBUTES.contains(&key(&attribute.trait_type).as_str())
            || attribute.value.as_str().is_some_and(contains_keyword)
    })
}

/// Reorder into the standard carbon-credit attribute set, filling gaps
///
/// Existing attributes matching a standard name are moved into place; the
/// rest keep their order after the standard block.
pub fn apply_carbon_template(
    attributes: Vec<Attribute>,
    token_id: &str,
) -> (Vec<Attribute>, Vec<Transformation>) {
    let mut remaining = attributes;
    let mut standard = Vec::with_capacity(STANDARD_ATTRIBUTES.len());
    let mut log = Vec::new();

    for (name, aliases) in STANDARD_ATTRIBUTES {
        let position = remaining
            .iter()
            .position(|a| aliases.contains(&key(&a.trait_type).as_str()));

        let attribute = match position {
            Some(index) => {
                let mut attribute = remaining.remove(index);
                if attribute.trait_type != *name {
                    log.push(Transformation::new(
                        "attributes",
                        attribute.trait_type.clone(),
                        *name,
                        "carbon credit attribute renamed",
                    ));
                    attribute.trait_type = name.to_string();
                }
                attribute
            }
            None => {
                let value = default_value(name, token_id);
                log.push(Transformation::new(
                    "attributes",
                    Value::Null,
                    serde_json::json!({ "trait_type": name, "value": value.clone() }),
                    "carbon credit attribute added",
                ));
                Attribute::new(*name, value)
            }
        };
        standard.push(attribute);
    }

    standard.extend(remaining);
    (standard, log)
}

fn default_value(name: &str, token_id: &str) -> Value {
    match name {
        "Tree ID" => Value::String(token_id.to_string()),
        "Carbon Offset" => Value::String("0 kg CO2".to_string()),
        _ => Value::String("Unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::source_record;
    use serde_json::json;

    fn plain_record() -> SourceRecord {
        let mut record = source_record("sei1c", "9");
        record.name = "Pixel Cat #9".into();
        record.description = "A cat".into();
        record
    }

    #[test]
    fn test_detects_keywords_in_text() {
        let mut record = plain_record();
        assert!(!is_carbon_credit(&record, &[]));

        record.description = "Backed by verified Carbon credits".into();
        assert!(is_carbon_credit(&record, &[]));
    }

    #[test]
    fn test_detects_known_attribute_names_and_values() {
        let record = plain_record();
        assert!(is_carbon_credit(&record, &[Attribute::new("Planting_Date", "2021-04-01")]));
        assert!(is_carbon_credit(&record, &[Attribute::new("Biome", "Rain Forest")]));
        assert!(!is_carbon_credit(&record, &[Attribute::new("Fur", "Orange")]));
    }

    #[test]
    fn test_template_fills_and_orders() {
        let attributes = vec![
            Attribute::new("Fur", "Orange"),
            Attribute::new("species", "Quercus robur"),
            Attribute::new("CO2", json!(120)),
        ];

        let (result, log) = apply_carbon_template(attributes, "9");

        let names: Vec<&str> = result.iter().map(|a| a.trait_type.as_str()).collect();
        assert_eq!(
            names,
            vec!["Tree ID", "Species", "Location", "Planting Date", "Carbon Offset", "Fur"]
        );
        assert_eq!(result[0].value, json!("9"));
        assert_eq!(result[1].value, json!("Quercus robur"));
        assert_eq!(result[4].value, json!(120));
        // 2 renames + 3 additions
        assert_eq!(log.len(), 5);
    }
}
