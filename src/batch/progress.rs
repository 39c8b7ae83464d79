use crate::humanize::format_eta;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    #[serde(skip)]
    pub elapsed: Duration,
    /// The batch ended early; its unfinished items are counted as failed
    pub degraded: bool,
    pub error: Option<String>,
}

impl BatchReport {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Job-level aggregate of finished batches
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchProgress {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub batches_done: usize,
    pub batches_degraded: usize,
    /// Batches running at once, used to scale the estimate
    pub concurrency: usize,
    #[serde(skip)]
    busy: Duration,
}

impl BatchProgress {
    pub fn new(total: u64, concurrency: usize) -> Self {
        Self {
            total,
            concurrency: concurrency.max(1),
            ..Default::default()
        }
    }

    pub fn fold(&mut self, report: &BatchReport) {
        self.processed += report.processed();
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.skipped += report.skipped;
        self.batches_done += 1;
        self.batches_degraded += usize::from(report.degraded);
        self.busy += report.elapsed;
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed + self.skipped)
    }

    /// Observed mean wall time per processed item
    pub fn avg_item_duration(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(self.busy.as_secs_f64() / self.processed as f64))
    }

    /// Time left at the observed per-item pace across all concurrent batches
    pub fn eta(&self) -> Option<Duration> {
        let avg = self.avg_item_duration()?;
        let remaining = self.remaining();
        let batches_worth = remaining.div_ceil(self.concurrency as u64);
        let secs = avg.as_secs_f64() * batches_worth as f64;
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    pub fn eta_display(&self) -> String {
        self.eta().map(format_eta).unwrap_or_else(|| "unknown".to_string())
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed + self.skipped) as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(succeeded: u64, failed: u64, secs: u64) -> BatchReport {
        BatchReport {
            size: succeeded + failed,
            succeeded,
            failed,
            elapsed: Duration::from_secs(secs),
            ..Default::default()
        }
    }

    #[test]
    fn test_fold_and_counts() {
        let mut progress = BatchProgress::new(30, 2);
        progress.fold(&report(9, 1, 10));
        progress.fold(&report(10, 0, 10));

        assert_eq!(progress.processed, 20);
        assert_eq!(progress.succeeded, 19);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.remaining(), 10);
        assert_eq!(progress.batches_done, 2);
    }

    #[test]
    fn test_eta_from_average() {
        let mut progress = BatchProgress::new(30, 2);
        assert!(progress.eta().is_none());
        assert_eq!(progress.eta_display(), "unknown");

        progress.fold(&report(10, 0, 10));
        progress.fold(&report(10, 0, 10));

        // 1s per item, 10 left over 2 lanes
        assert_eq!(progress.avg_item_duration(), Some(Duration::from_secs(1)));
        assert_eq!(progress.eta(), Some(Duration::from_secs(5)));
        assert_eq!(progress.eta_display(), "5s");
    }

    #[test]
    fn test_eta_beyond_u32_counts() {
        let total = u64::from(u32::MAX) * 4;
        let mut progress = BatchProgress::new(total, 1);
        let processed = u64::from(u32::MAX) + 2;
        progress.fold(&report(processed, 0, processed / 1000));

        let avg = progress.avg_item_duration().unwrap();
        assert!(avg > Duration::from_micros(990) && avg < Duration::from_micros(1010));

        let eta = progress.eta().unwrap();
        let expected = (total - processed) as f64 / 1000.0;
        assert!((eta.as_secs_f64() - expected).abs() / expected < 0.01);
    }

    #[test]
    fn test_skipped_items_count_as_done_for_percent() {
        let mut progress = BatchProgress::new(4, 1);
        progress.fold(&BatchReport {
            size: 4,
            succeeded: 1,
            skipped: 3,
            ..Default::default()
        });
        assert_eq!(progress.remaining(), 0);
        assert_eq!(progress.percent(), 100.0);
    }
}
