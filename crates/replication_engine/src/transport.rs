//! Transport abstraction between a follower and its primary.
//!
//! The follower only ever pulls — there is no push or handshake step, since
//! the primary is passive and simply serves ranges of its own WAL
//! (spec.md §4.5). Keeping the trait to a single method is what lets
//! [`crate::state::Coordinator`] stay agnostic of HTTP, in-process, or test
//! doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use replication_protocol::{PullRequest, PullResponse};

use crate::error::ReplicationResult;

/// Fetches WAL ranges from a primary. Implementations must be cheap to
/// clone/share across the coordinator's per-database tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Pulls up to `request.limit` entries starting at `request.from_position`.
    async fn pull(&self, request: PullRequest) -> ReplicationResult<PullResponse>;
}

/// A test double that returns pre-programmed responses or errors in
/// sequence, falling back to the last one once exhausted.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<Vec<ReplicationResult<PullResponse>>>,
}

impl MockTransport {
    /// Creates an empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next response to return.
    pub fn push_response(&self, response: ReplicationResult<PullResponse>) {
        self.responses.lock().push(response);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn pull(&self, _request: PullRequest) -> ReplicationResult<PullResponse> {
        let mut queue = self.responses.lock();
        if queue.is_empty() {
            return Err(crate::error::ReplicationError::transport(
                "mock transport exhausted",
            ));
        }
        if queue.len() == 1 {
            // Keep returning the last entry so long-running pull loops in
            // tests don't need to queue one response per iteration.
            match &queue[0] {
                Ok(response) => Ok(response.clone()),
                Err(_) => queue.remove(0),
            }
        } else {
            queue.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use node_core::DatabaseId;

    use super::*;

    #[tokio::test]
    async fn mock_transport_returns_queued_response() {
        let transport = MockTransport::new();
        transport.push_response(Ok(PullResponse {
            entries: vec![],
            current_position: 0,
        }));

        let result = transport
            .pull(PullRequest {
                database_id: DatabaseId::new(),
                from_position: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(result.current_position, 0);
    }

    #[tokio::test]
    async fn mock_transport_errors_when_exhausted() {
        let transport = MockTransport::new();
        let result = transport
            .pull(PullRequest {
                database_id: DatabaseId::new(),
                from_position: 0,
                limit: 10,
            })
            .await;
        assert!(result.is_err());
    }
}
