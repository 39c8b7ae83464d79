//! Source record -> target metadata mapping
//!
//! Rules run in a fixed order (name, description, uris, attributes, symbol,
//! template, provenance) and every change is recorded as a [`Transformation`].
//! Mapping never fails: problems are reported through `is_valid` and `errors`.

mod rules;
mod templates;

use crate::config::{ExportConfig, MappingConfig};
use crate::export::rewrite_content_uri;
use crate::models::{
    Attribute, CollectionInfo, FileRef, Mapping, SourceRecord, Template, Transformation,
};
use tracing::debug;

pub use rules::truncate_chars;
pub use templates::is_carbon_credit;

pub struct Mapper {
    rules: MappingConfig,
    ipfs_gateway: String,
    arweave_gateway: String,
}

impl Mapper {
    pub fn new(rules: MappingConfig, export: &ExportConfig) -> Self {
        Self {
            rules,
            ipfs_gateway: export.ipfs_gateway.clone(),
            arweave_gateway: export.arweave_gateway.clone(),
        }
    }

    pub fn rules(&self) -> &MappingConfig {
        &self.rules
    }

    pub fn map(&self, record: &SourceRecord) -> Mapping {
        let mut mapping = Mapping::new(record.clone());
        let rewrite = |uri: &str| rewrite_content_uri(uri, &self.ipfs_gateway, &self.arweave_gateway);

        let (name, log) = rules::name(&record.name, &record.source_token_id, self.rules.max_name_length);
        mapping.target.name = name;
        self.apply(&mut mapping, log);

        let (description, log) = rules::description(
            &record.description,
            &self.rules.default_description,
            self.rules.max_description_length,
        );
        mapping.target.description = description;
        self.apply(&mut mapping, log);

        let (image, log) = rules::uri("image", &record.image_uri, rewrite);
        mapping.target.image = image;
        self.apply(&mut mapping, log);

        if let Some(external) = record.external_uri.as_deref().filter(|u| !u.trim().is_empty()) {
            let (external, log) = rules::uri("external_url", external, rewrite);
            mapping.target.external_url = Some(external);
            self.apply(&mut mapping, log);
        }

        let (mut attributes, log) = rules::attributes(&record.attributes);
        self.apply(&mut mapping, log);

        let (symbol, log) = rules::symbol(
            record.collection_symbol.as_deref(),
            &record.name,
            &self.rules.default_symbol,
            self.rules.max_symbol_length,
        );
        mapping.target.symbol = symbol;
        self.apply(&mut mapping, log);

        if templates::is_carbon_credit(record, &attributes) {
            mapping.template = Template::CarbonCredit;
            let (templated, log) = templates::apply_carbon_template(attributes, &record.source_token_id);
            attributes = templated;
            self.apply(&mut mapping, log);
        }

        attributes.push(Attribute::new("Migration Source", self.rules.migration_source.clone()));
        attributes.push(Attribute::new("Original Contract", record.source_contract.clone()));
        attributes.push(Attribute::new("Original Token ID", record.source_token_id.clone()));
        mapping.target.attributes = attributes;

        mapping.target.seller_fee_basis_points = self.rules.seller_fee_basis_points;
        if !mapping.target.image.is_empty() {
            mapping.target.properties.files = vec![FileRef {
                uri: mapping.target.image.clone(),
                mime: rules::mime_type(&mapping.target.image).to_string(),
            }];
        }
        mapping.target.collection = record.collection_name.as_ref().map(|name| CollectionInfo {
            name: name.clone(),
            family: self.rules.migration_source.clone(),
        });

        if mapping.target.name.is_empty() {
            mapping.fail("missing required field: name");
        }
        if mapping.target.image.is_empty() {
            mapping.fail("missing required field: image");
        }

        mapping
    }

    fn apply(&self, mapping: &mut Mapping, log: Vec<Transformation>) {
        for transformation in log {
            debug!(
                record = %mapping.source.key(),
                field = %transformation.field,
                reason = %transformation.reason,
                "Field transformed"
            );
            mapping.record(transformation);
        }
    }
}
