//! Bounded-concurrency batch execution
//!
//! Items are split into fixed-size batches; at most `max_concurrent_batches`
//! run at once (a counting semaphore) and their reports are folded into a
//! [`BatchProgress`] in completion order.

mod coordinator;
mod progress;

pub use coordinator::{BatchCoordinator, BatchRun, ItemOutcome, ItemProcessor};
pub use progress::{BatchProgress, BatchReport};
