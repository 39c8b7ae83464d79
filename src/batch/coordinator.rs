use super::progress::{BatchProgress, BatchReport};
use crate::config::BatchConfig;
use crate::error::MigrationError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed,
}

/// Runs one item through the whole per-item pipeline
///
/// `Err` means the batch cannot continue (for example the store is gone);
/// ordinary item failures are `Ok(ItemOutcome::Failed)`.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    type Item: Send + 'static;

    async fn process(&self, item: Self::Item) -> Result<ItemOutcome, MigrationError>;
}

/// Result of a full coordinator run
#[derive(Debug)]
pub struct BatchRun {
    pub progress: BatchProgress,
    /// Batch reports in completion order
    pub reports: Vec<BatchReport>,
}

impl BatchRun {
    /// First unrecoverable batch error, if any
    pub fn fatal_error(&self) -> Option<&str> {
        self.reports.iter().find_map(|r| r.error.as_deref())
    }
}

#[derive(Default)]
struct Tally {
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Tally {
    fn report(&self, index: usize, size: u64, started: Instant) -> BatchReport {
        BatchReport {
            index,
            size,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
            degraded: false,
            error: None,
        }
    }

    /// Everything not yet accounted for becomes a failure
    fn degrade(&self, mut report: BatchReport, error: String) -> BatchReport {
        let accounted = report.succeeded + report.failed + report.skipped;
        report.failed += report.size.saturating_sub(accounted);
        report.degraded = true;
        report.error = Some(error);
        report
    }
}

/// Splits items into fixed-size batches and runs a bounded number at once
pub struct BatchCoordinator {
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchCoordinator {
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.batch_size, config.max_concurrent_batches)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Process every item; batches are folded into the progress as they finish
    ///
    /// Items inside a batch run sequentially. Once `cancel` fires, no batch
    /// starts another item and the rest are counted as skipped.
    pub async fn run<P: ItemProcessor>(
        &self,
        items: Vec<P::Item>,
        processor: Arc<P>,
        cancel: CancellationToken,
    ) -> BatchRun {
        let total = items.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut progress = BatchProgress::new(total, self.max_concurrent);
        let mut reports = Vec::new();
        let mut set = JoinSet::new();
        let mut spawned = HashMap::new();

        let mut items = items.into_iter().peekable();
        let mut index = 0;
        while items.peek().is_some() {
            let batch: Vec<P::Item> = items.by_ref().take(self.batch_size).collect();
            let size = batch.len() as u64;
            let tally = Arc::new(Tally::default());

            let handle = set.spawn(run_batch(
                index,
                batch,
                processor.clone(),
                semaphore.clone(),
                tally.clone(),
                cancel.clone(),
            ));
            spawned.insert(handle.id(), (index, size, tally, Instant::now()));
            index += 1;
        }

        info!(
            items = total,
            batches = index,
            max_concurrent = self.max_concurrent,
            "Batches scheduled"
        );

        while let Some(joined) = set.join_next_with_id().await {
            let report = match joined {
                Ok((_, report)) => report,
                Err(join_error) => {
                    let Some((index, size, tally, started)) = spawned.get(&join_error.id()) else {
                        error!(error = %join_error, "Unknown batch task ended abnormally");
                        continue;
                    };
                    error!(batch = index, error = %join_error, "Batch task ended abnormally");
                    tally.degrade(tally.report(*index, *size, *started), join_error.to_string())
                }
            };

            progress.fold(&report);
            info!(
                batch = report.index,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                degraded = report.degraded,
                processed = progress.processed,
                total = progress.total,
                eta = %progress.eta_display(),
                "Batch finished"
            );
            reports.push(report);
        }

        BatchRun { progress, reports }
    }
}

async fn run_batch<P: ItemProcessor>(
    index: usize,
    batch: Vec<P::Item>,
    processor: Arc<P>,
    semaphore: Arc<Semaphore>,
    tally: Arc<Tally>,
    cancel: CancellationToken,
) -> BatchReport {
    let size = batch.len() as u64;

    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit,
        _ = cancel.cancelled() => {
            tally.skipped.store(size, Ordering::Relaxed);
            return tally.report(index, size, Instant::now());
        }
    };
    let started = Instant::now();

    let mut items = batch.into_iter();
    for item in items.by_ref() {
        if cancel.is_cancelled() {
            tally.skipped.fetch_add(1, Ordering::Relaxed);
            break;
        }
        match processor.process(item).await {
            Ok(ItemOutcome::Succeeded) => {
                tally.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(ItemOutcome::Failed) => {
                tally.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(batch = index, error = %err, "Batch aborted");
                tally.failed.fetch_add(1, Ordering::Relaxed);
                return tally.degrade(tally.report(index, size, started), err.to_string());
            }
        }
    }
    tally
        .skipped
        .fetch_add(items.len() as u64, Ordering::Relaxed);

    tally.report(index, size, started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Fails items listed in `fail`, panics on `panic`, aborts on `fatal`
    struct Scripted {
        fail: Vec<u32>,
        panic: Option<u32>,
        fatal: Option<u32>,
        delay: Duration,
        seen: Mutex<Vec<u32>>,
        in_flight: AtomicU64,
        peak: AtomicU64,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                fail: Vec::new(),
                panic: None,
                fatal: None,
                delay: Duration::from_millis(1),
                seen: Mutex::new(Vec::new()),
                in_flight: AtomicU64::new(0),
                peak: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl ItemProcessor for Scripted {
        type Item = u32;

        async fn process(&self, item: u32) -> Result<ItemOutcome, MigrationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().push(item);

            if self.panic == Some(item) {
                panic!("item {} exploded", item);
            }
            if self.fatal == Some(item) {
                return Err(MigrationError::Validation("store offline".into()));
            }
            if self.fail.contains(&item) {
                return Ok(ItemOutcome::Failed);
            }
            Ok(ItemOutcome::Succeeded)
        }
    }

    #[tokio::test]
    async fn test_one_failure_in_batch_of_ten() {
        let mut processor = Scripted::new();
        processor.fail = vec![4];
        let processor = Arc::new(processor);

        let run = BatchCoordinator::new(10, 2)
            .run((1..=20).collect(), processor.clone(), CancellationToken::new())
            .await;

        assert_eq!(run.reports.len(), 2);
        let first = run.reports.iter().find(|r| r.index == 0).unwrap();
        assert_eq!((first.processed(), first.succeeded, first.failed), (10, 9, 1));
        let second = run.reports.iter().find(|r| r.index == 1).unwrap();
        assert_eq!((second.processed(), second.succeeded, second.failed), (10, 10, 0));

        assert_eq!(run.progress.processed, 20);
        assert_eq!(run.progress.failed, 1);
        assert!(run.fatal_error().is_none());
    }

    #[tokio::test]
    async fn test_concurrency_bounded() {
        let processor = Arc::new(Scripted::new());

        let run = BatchCoordinator::new(2, 3)
            .run((0..24).collect(), processor.clone(), CancellationToken::new())
            .await;

        assert_eq!(run.progress.succeeded, 24);
        assert!(processor.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(processor.seen.lock().len(), 24);
    }

    #[tokio::test]
    async fn test_panicked_batch_degrades_alone() {
        let mut processor = Scripted::new();
        processor.panic = Some(2);
        let processor = Arc::new(processor);

        let run = BatchCoordinator::new(5, 2)
            .run((0..10).collect(), processor, CancellationToken::new())
            .await;

        let broken = run.reports.iter().find(|r| r.index == 0).unwrap();
        assert!(broken.degraded);
        // items 0 and 1 succeeded, 2 panicked, 3 and 4 never ran
        assert_eq!((broken.succeeded, broken.failed), (2, 3));

        let sibling = run.reports.iter().find(|r| r.index == 1).unwrap();
        assert!(!sibling.degraded);
        assert_eq!(sibling.succeeded, 5);
        assert_eq!(run.progress.processed, 10);
        assert_eq!(run.progress.batches_degraded, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_only_its_batch() {
        let mut processor = Scripted::new();
        processor.fatal = Some(6);
        let processor = Arc::new(processor);

        let run = BatchCoordinator::new(5, 1)
            .run((0..15).collect(), processor, CancellationToken::new())
            .await;

        assert_eq!(run.fatal_error(), Some("validation failed: store offline"));
        let broken = run.reports.iter().find(|r| r.index == 1).unwrap();
        assert_eq!((broken.succeeded, broken.failed), (1, 4));
        assert_eq!(run.progress.succeeded, 11);
    }

    #[tokio::test]
    async fn test_cancel_skips_remaining_items() {
        let mut processor = Scripted::new();
        processor.delay = Duration::from_millis(20);
        let processor = Arc::new(processor);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let run = BatchCoordinator::new(10, 1)
            .run((0..30).collect(), processor.clone(), cancel)
            .await;

        let seen = processor.seen.lock().len() as u64;
        assert!(seen < 30);
        assert_eq!(run.progress.processed, seen);
        assert_eq!(run.progress.skipped, 30 - seen);
    }
}
