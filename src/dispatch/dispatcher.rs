//! Single-flight FIFO job queue.

use std::collections::VecDeque;

use crate::models::Job;

/// Owns the busy flag and the backlog. At most one job is handed out
/// between a `submit`/`finish` that returns `Some` and the next `finish`.
#[derive(Debug, Default)]
pub struct Dispatcher {
    busy: bool,
    queue: VecDeque<Job>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a job. Returns it back when it should start now (the
    /// dispatcher was idle), otherwise queues it behind the running job.
    pub fn submit(&mut self, job: Job) -> Option<Job> {
        if self.busy {
            self.queue.push_back(job);
            None
        } else {
            self.busy = true;
            Some(job)
        }
    }

    /// The running job is done. Returns the next job to start, or goes idle.
    pub fn finish(&mut self) -> Option<Job> {
        match self.queue.pop_front() {
            Some(next) => Some(next),
            None => {
                self.busy = false;
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Jobs waiting behind the running one.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, JobType};
    use serde_json::json;

    fn job(name: &str) -> Job {
        let mut filters = Filters::new();
        filters.insert("q_keywords".into(), json!(name));
        Job::new(JobType::People, filters, 100)
    }

    fn keyword(job: &Job) -> &str {
        job.filters["q_keywords"].as_str().unwrap()
    }

    #[test]
    fn test_idle_dispatcher_starts_job() {
        let mut d = Dispatcher::new();
        assert!(!d.is_busy());
        let started = d.submit(job("a")).unwrap();
        assert_eq!(keyword(&started), "a");
        assert!(d.is_busy());
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_busy_dispatcher_queues_fifo() {
        let mut d = Dispatcher::new();
        d.submit(job("a")).unwrap();
        assert!(d.submit(job("b")).is_none());
        assert!(d.submit(job("c")).is_none());
        assert!(d.submit(job("b")).is_none());
        assert_eq!(d.pending(), 3);

        let order: Vec<String> = std::iter::from_fn(|| d.finish())
            .map(|j| keyword(&j).to_string())
            .collect();
        assert_eq!(order, vec!["b", "c", "b"]);
        assert!(!d.is_busy());
    }

    #[test]
    fn test_finish_when_empty_goes_idle() {
        let mut d = Dispatcher::new();
        d.submit(job("a")).unwrap();
        assert!(d.finish().is_none());
        assert!(!d.is_busy());

        // Idle again, so the next submission starts right away.
        assert!(d.submit(job("b")).is_some());
    }
}
