//! The three integrity tiers
//!
//! Each check appends to a [`ValidationResult`] instead of returning early, so
//! a single call reports every problem with the item.

use super::result::{Tier, ValidationResult};
use crate::config::ValidationConfig;
use crate::models::{SourceRecord, TargetMetadata, canonical_json};
use serde_json::Value;

pub const MAX_SOURCE_NAME: usize = 256;
pub const MAX_SOURCE_DESCRIPTION: usize = 10_000;
pub const MAX_URI: usize = 2048;

fn too_long(value: &str, max: usize) -> bool {
    value.chars().count() > max
}

/// Required fields, length ceilings and the content hash
pub fn data(record: &SourceRecord, result: &mut ValidationResult) {
    for (field, value) in [
        ("source_contract", &record.source_contract),
        ("source_token_id", &record.source_token_id),
        ("owner", &record.owner),
    ] {
        if value.trim().is_empty() {
            result.error(Tier::Data, format!("missing required field: {}", field));
        }
    }

    if too_long(&record.name, MAX_SOURCE_NAME) {
        result.error(Tier::Data, format!("name exceeds {} characters", MAX_SOURCE_NAME));
    }
    if too_long(&record.description, MAX_SOURCE_DESCRIPTION) {
        result.error(
            Tier::Data,
            format!("description exceeds {} characters", MAX_SOURCE_DESCRIPTION),
        );
    }
    if too_long(&record.image_uri, MAX_URI) {
        result.error(Tier::Data, format!("image uri exceeds {} characters", MAX_URI));
    }
    if record.external_uri.as_deref().is_some_and(|u| too_long(u, MAX_URI)) {
        result.error(Tier::Data, format!("external uri exceeds {} characters", MAX_URI));
    }

    if record.content_hash.is_empty() {
        result.error(Tier::Data, "content hash missing");
    } else if !record.verify_hash() {
        result.error(
            Tier::Data,
            format!(
                "content hash mismatch: stored {}, computed {}",
                record.content_hash,
                record.compute_hash()
            ),
        );
    }
}

/// Value survives canonical serialization unchanged
fn round_trips(value: &Value) -> bool {
    serde_json::from_str::<Value>(&canonical_json(value)).is_ok_and(|parsed| parsed == *value)
}

/// Source attributes and raw metadata must serialize canonically
pub fn source_metadata(record: &SourceRecord, rules: &ValidationConfig, result: &mut ValidationResult) {
    for (index, attribute) in record.attributes.iter().enumerate() {
        if !round_trips(attribute) {
            result.error(
                Tier::Metadata,
                format!("attribute {} does not survive canonical serialization", index),
            );
        }
    }
    if !round_trips(&record.raw_metadata) {
        result.error(Tier::Metadata, "raw metadata does not survive canonical serialization");
    }
    if record.attributes.len() > rules.max_attributes {
        result.warn(
            Tier::Metadata,
            format!(
                "{} attributes exceeds the soft maximum of {}",
                record.attributes.len(),
                rules.max_attributes
            ),
        );
    }
}

/// Target metadata must round-trip through its own wire form and carry the required fields
pub fn target_metadata(target: &TargetMetadata, rules: &ValidationConfig, result: &mut ValidationResult) {
    match serde_json::to_value(target) {
        Ok(value) => {
            let canonical = canonical_json(&value);
            let restored = serde_json::from_str::<TargetMetadata>(&canonical)
                .and_then(|restored| serde_json::to_value(&restored));
            if !restored.is_ok_and(|restored| canonical_json(&restored) == canonical) {
                result.error(Tier::Metadata, "target metadata does not round-trip");
            }
        }
        Err(err) => result.error(Tier::Metadata, format!("target metadata not serializable: {}", err)),
    }

    for (field, value) in [
        ("name", &target.name),
        ("symbol", &target.symbol),
        ("image", &target.image),
    ] {
        if value.trim().is_empty() {
            result.error(Tier::Metadata, format!("missing required field: {}", field));
        }
    }

    if target.attributes.len() > rules.max_attributes {
        result.warn(
            Tier::Metadata,
            format!(
                "{} attributes exceeds the soft maximum of {}",
                target.attributes.len(),
                rules.max_attributes
            ),
        );
    }
}

/// Address shape and token id presence; duplicates are checked separately against the store
pub fn ledger(
    record: &SourceRecord,
    recipient: Option<Option<&str>>,
    rules: &ValidationConfig,
    result: &mut ValidationResult,
) {
    if record.source_token_id.trim().is_empty() {
        result.error(Tier::Ledger, "token id missing");
    }

    let owner = record.owner.trim();
    if !owner.starts_with(&rules.source_address_prefix) {
        result.error(
            Tier::Ledger,
            format!("owner {} lacks the {} prefix", owner, rules.source_address_prefix),
        );
    }
    if owner.len() < rules.min_source_address_len {
        result.error(
            Tier::Ledger,
            format!(
                "owner address shorter than {} characters",
                rules.min_source_address_len
            ),
        );
    }

    if let Some(recipient) = recipient {
        match recipient.map(str::trim).filter(|r| !r.is_empty()) {
            None => result.error(Tier::Ledger, format!("no recipient mapped for owner {}", owner)),
            Some(recipient) if recipient.len() < rules.min_target_address_len => result.error(
                Tier::Ledger,
                format!(
                    "recipient address shorter than {} characters",
                    rules.min_target_address_len
                ),
            ),
            Some(_) => {}
        }
    }
}
