//! Domain records shared across the pipeline

mod job;
mod metadata;
mod record;

pub use job::{
    Job, JobStatus, LogEntry, LogLevel, MigrationRecord, Phase, RecordCounts, RecordStatus,
};
pub use metadata::{
    Attribute, CollectionInfo, FileRef, Mapping, Properties, TargetMetadata, Template,
    Transformation,
};
pub use record::{SourceRecord, canonical_json};
