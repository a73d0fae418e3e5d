//! Job dispatch: single-flight FIFO queue, the job runner, and the loop
//! that ties them to the stream of submitted jobs.
//!
//! All queue and history mutation happens on the dispatch loop's task; the
//! event source only sends `Job`s over a channel.

mod dispatcher;
pub mod runner;
mod service;

pub use dispatcher::Dispatcher;
pub use runner::{JobOutcome, JobRunner};
pub use service::{DispatchLoop, DispatchSummary};
