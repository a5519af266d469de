mod service;
pub mod tasks;

pub use service::{SchedulerEvent, SchedulerService};
pub use tasks::{ingest_feed, run_batch, select_batch, BatchSummary, IngestOutcome, IngestSummary};
