//! Pairs observed requests with their responses.
//!
//! Request, response and failure notifications arrive on separate streams,
//! so a response may be seen before its request. Whichever half comes first
//! is parked until the other arrives; failed requests are evicted, and the
//! number of parked entries is bounded.

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::NetworkEvent;

/// Parked entries kept before the oldest is dropped.
pub const DEFAULT_TRACKER_CAPACITY: usize = 1024;

/// One browser-side notification about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// Request about to be sent, with its body if it had one.
    Request {
        id: String,
        method: String,
        post_data: Option<String>,
    },
    /// Response headers received.
    Response { id: String, url: String, status: u16 },
    /// Request failed or was cancelled; no response will follow.
    Failed { id: String },
}

#[derive(Debug)]
enum Parked {
    Request {
        method: String,
        post_data: Option<String>,
    },
    Response {
        url: String,
        status: u16,
    },
}

/// Bounded request/response pairing state.
#[derive(Debug)]
pub struct RequestTracker {
    parked: HashMap<String, (u64, Parked)>,
    seq: u64,
    capacity: usize,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKER_CAPACITY)
    }
}

impl RequestTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            parked: HashMap::new(),
            seq: 0,
            capacity: capacity.max(1),
        }
    }

    /// Entries waiting for their other half.
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    /// Feed one notification; returns an event once both halves are known.
    pub fn observe(&mut self, observed: Observed) -> Option<NetworkEvent> {
        match observed {
            Observed::Request {
                id,
                method,
                post_data,
            } => match self.parked.remove(&id) {
                Some((_, Parked::Response { url, status })) => Some(NetworkEvent {
                    method,
                    url,
                    status,
                    post_data,
                }),
                // A redirect re-sends under the same id; the latest request wins.
                _ => {
                    self.park(id, Parked::Request { method, post_data });
                    None
                }
            },
            Observed::Response { id, url, status } => match self.parked.remove(&id) {
                Some((_, Parked::Request { method, post_data })) => Some(NetworkEvent {
                    method,
                    url,
                    status,
                    post_data,
                }),
                _ => {
                    self.park(id, Parked::Response { url, status });
                    None
                }
            },
            Observed::Failed { id } => {
                self.parked.remove(&id);
                None
            }
        }
    }

    fn park(&mut self, id: String, entry: Parked) {
        self.seq += 1;
        self.parked.insert(id, (self.seq, entry));

        if self.parked.len() > self.capacity {
            let oldest = self
                .parked
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(request_id = %id, "Dropping unmatched request");
                self.parked.remove(&id);
            }
        }
    }
}

/// Pair notifications from `observed` and forward complete events to `tx`
/// until either side ends.
pub async fn correlate<S>(
    mut observed: S,
    mut tracker: RequestTracker,
    tx: mpsc::Sender<NetworkEvent>,
) where
    S: Stream<Item = Observed> + Unpin,
{
    while let Some(item) = observed.next().await {
        if let Some(event) = tracker.observe(item) {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const JOBS_URL: &str = "https://project.supabase.co/rest/v1/scrape_jobs";

    fn request(id: &str, method: &str, body: Option<&str>) -> Observed {
        Observed::Request {
            id: id.into(),
            method: method.into(),
            post_data: body.map(str::to_string),
        }
    }

    fn response(id: &str, status: u16) -> Observed {
        Observed::Response {
            id: id.into(),
            url: JOBS_URL.into(),
            status,
        }
    }

    #[test]
    fn test_request_then_response() {
        let mut tracker = RequestTracker::default();
        assert_eq!(tracker.observe(request("1", "POST", Some("{}"))), None);

        let event = tracker.observe(response("1", 201)).unwrap();
        assert_eq!(event.method, "POST");
        assert_eq!(event.status, 201);
        assert_eq!(event.post_data.as_deref(), Some("{}"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_response_before_request_keeps_method_and_body() {
        let mut tracker = RequestTracker::default();
        assert_eq!(tracker.observe(response("7", 201)), None);

        let event = tracker.observe(request("7", "POST", Some(r#"{"a":1}"#))).unwrap();
        assert_eq!(event.method, "POST");
        assert_eq!(event.url, JOBS_URL);
        assert_eq!(event.post_data.as_deref(), Some(r#"{"a":1}"#));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_failed_request_is_evicted() {
        let mut tracker = RequestTracker::default();
        tracker.observe(request("9", "POST", None));
        assert_eq!(tracker.len(), 1);

        tracker.observe(Observed::Failed { id: "9".into() });
        assert!(tracker.is_empty());
        // A late response for the evicted id is parked, not paired.
        assert_eq!(tracker.observe(response("9", 200)), None);
    }

    #[test]
    fn test_unanswered_requests_are_bounded() {
        let mut tracker = RequestTracker::new(3);
        for id in ["a", "b", "c", "d", "e"] {
            tracker.observe(request(id, "GET", None));
        }
        assert_eq!(tracker.len(), 3);

        // The oldest were dropped; the newest still pair.
        assert_eq!(tracker.observe(Observed::Failed { id: "a".into() }), None);
        assert!(tracker.observe(response("e", 200)).is_some());
        assert_eq!(tracker.len(), 2);
    }

    #[tokio::test]
    async fn test_correlate_forwards_paired_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let items = stream::iter(vec![
            response("2", 201),
            request("1", "GET", None),
            request("2", "POST", Some("{}")),
            Observed::Failed { id: "1".into() },
            request("3", "POST", None),
        ]);

        correlate(items, RequestTracker::default(), tx).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.method, "POST");
        assert_eq!(event.status, 201);
        assert_eq!(rx.recv().await, None);
    }
}
