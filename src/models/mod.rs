//! Data models for discovery jobs and their runs.

mod job;
mod run;

pub use job::{Filters, Job, JobType, QueryFingerprint};
pub use run::{HistoryEntry, RunReport, RunStats, RunStatus};
