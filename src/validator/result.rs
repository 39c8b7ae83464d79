use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Record,
    Mapping,
    JobProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Data,
    Metadata,
    Ledger,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Data => "data",
            Tier::Metadata => "metadata",
            Tier::Ledger => "ledger",
        }
    }
}

/// Per-tier pass/fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityFlags {
    pub data: bool,
    pub metadata: bool,
    pub ledger: bool,
}

impl Default for IntegrityFlags {
    fn default() -> Self {
        Self {
            data: true,
            metadata: true,
            ledger: true,
        }
    }
}

/// Outcome of one validation call; never changed after it is returned
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub integrity: IntegrityFlags,
    pub total: u64,
    pub validated: u64,
    pub success: u64,
    pub failed: u64,
    pub duration_ms: u64,
    pub rollback_required: bool,
    pub rollback_steps: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            scope,
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            integrity: IntegrityFlags::default(),
            total: 0,
            validated: 0,
            success: 0,
            failed: 0,
            duration_ms: 0,
            rollback_required: false,
            rollback_steps: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, tier: Tier, message: impl Into<String>) {
        match tier {
            Tier::Data => self.integrity.data = false,
            Tier::Metadata => self.integrity.metadata = false,
            Tier::Ledger => self.integrity.ledger = false,
        }
        self.is_valid = false;
        self.errors.push(format!("{}: {}", tier.as_str(), message.into()));
    }

    pub(crate) fn warn(&mut self, tier: Tier, message: impl Into<String>) {
        self.warnings.push(format!("{}: {}", tier.as_str(), message.into()));
    }

    /// Close a single-item validation
    pub(crate) fn finish_item(mut self, started: Instant) -> Self {
        self.total = 1;
        self.validated = 1;
        self.success = u64::from(self.is_valid);
        self.failed = u64::from(!self.is_valid);
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }

    /// All errors joined for storing on a failed item
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}
