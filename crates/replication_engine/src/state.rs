//! Follower-side state machine and pull loop.
//!
//! A database replicated onto this node moves through three states
//! (spec.md §4.5): `catching_up` while it is behind the primary,
//! `live` once a pull returns fewer entries than requested (meaning the
//! follower has drained the primary's backlog), and `faulted` once the
//! hash chain breaks or the retry budget for transport failures is
//! exhausted. `faulted` is terminal — a faulted database requires
//! operator intervention and is never retried automatically.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use node_core::{ApplyResult, DatabaseId, NodeResult, WalEntry};
use parking_lot::RwLock;
use replication_protocol::{PullRequest, WalEntryWire};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::Transport;

/// Current convergence state of a replicated database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowerState {
    /// Behind the primary; pulling as fast as the transport allows.
    CatchingUp,
    /// Caught up; polling at [`ReplicationConfig::poll_interval`].
    Live,
    /// Stopped pulling after a fatal error. Requires operator action.
    Faulted {
        /// Human-readable reason, surfaced via status endpoints.
        reason: String,
    },
}

impl FollowerState {
    /// Whether the follower should keep attempting to pull.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Faulted { .. })
    }
}

/// Narrow handle a [`Coordinator`] uses to read and mutate the locally
/// hosted replica database, implemented for [`node_core::Node`]. Keeping
/// this as a trait (rather than the coordinator holding an `Arc<Node>`
/// directly) avoids the node and replication crates depending on each
/// other's concrete types.
pub trait ReplicaHandle: Send + Sync {
    /// Returns the database's current WAL position.
    fn current_position(&self, database_id: DatabaseId) -> NodeResult<u64>;

    /// Applies a batch of already-ordered WAL entries, idempotently.
    fn apply_entries(&self, database_id: DatabaseId, entries: &[WalEntry]) -> NodeResult<ApplyResult>;
}

impl ReplicaHandle for node_core::Node {
    fn current_position(&self, database_id: DatabaseId) -> NodeResult<u64> {
        self.current_wal_position(database_id)
    }

    fn apply_entries(&self, database_id: DatabaseId, entries: &[WalEntry]) -> NodeResult<ApplyResult> {
        self.apply_wal_entries(database_id, entries)
    }
}

/// Outcome of a single pull-and-apply cycle.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    /// Entries accepted this cycle.
    pub accepted: u64,
    /// The database's position after applying.
    pub new_position: u64,
    /// Whether the primary had more entries beyond this pull's limit.
    pub caught_up: bool,
}

/// Drives one database's replication from a primary: polls via a
/// [`Transport`], applies accepted entries through a [`ReplicaHandle`],
/// and tracks [`FollowerState`].
pub struct Coordinator<T, R> {
    database_id: DatabaseId,
    transport: Arc<T>,
    replica: Arc<R>,
    config: ReplicationConfig,
    state: RwLock<FollowerState>,
    attempt: AtomicU32,
    primary_position: std::sync::atomic::AtomicU64,
}

impl<T, R> Coordinator<T, R>
where
    T: Transport,
    R: ReplicaHandle,
{
    /// Creates a coordinator for `database_id`, starting in `catching_up`.
    pub fn new(database_id: DatabaseId, transport: Arc<T>, replica: Arc<R>, config: ReplicationConfig) -> Self {
        Self {
            database_id,
            transport,
            replica,
            config,
            state: RwLock::new(FollowerState::CatchingUp),
            attempt: AtomicU32::new(0),
            primary_position: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// This database's id.
    #[must_use]
    pub const fn database_id(&self) -> DatabaseId {
        self.database_id
    }

    /// Positions this replica is behind the primary as of the last
    /// successful pull (spec.md §6 `node_replication_lag`). `0` before
    /// the first successful pull.
    #[must_use]
    pub fn lag(&self) -> u64 {
        let primary = self.primary_position.load(Ordering::SeqCst);
        let local = self.replica.current_position(self.database_id).unwrap_or(primary);
        primary.saturating_sub(local)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> FollowerState {
        self.state.read().clone()
    }

    fn set_state(&self, state: FollowerState) {
        *self.state.write() = state;
    }

    /// Performs a single pull-and-apply cycle, updating [`FollowerState`]
    /// on success or failure. Returns the fatal error, if any, so the
    /// caller's loop can decide whether to keep running.
    pub async fn step(&self) -> ReplicationResult<PullOutcome> {
        if let FollowerState::Faulted { .. } = self.state() {
            return Err(ReplicationError::Faulted {
                database_id: self.database_id,
            });
        }

        let from_position = self
            .replica
            .current_position(self.database_id)
            .map_err(ReplicationError::Node)?
            + 1;

        let pull_result = self
            .transport
            .pull(PullRequest {
                database_id: self.database_id,
                from_position,
                limit: self.config.pull_batch_size,
            })
            .await;

        let response = match pull_result {
            Ok(response) => response,
            Err(err) => return self.handle_failure(err),
        };
        self.primary_position.store(response.current_position, Ordering::SeqCst);

        let entries: Result<Vec<WalEntry>, _> = response
            .entries
            .iter()
            .map(WalEntryWire::to_entry)
            .collect();
        let entries = match entries {
            Ok(entries) => entries,
            Err(err) => return self.handle_failure(ReplicationError::Protocol(err)),
        };

        let pulled_count = entries.len() as u64;
        let apply_result = match self.replica.apply_entries(self.database_id, &entries) {
            Ok(result) => result,
            Err(err) => return self.handle_failure(ReplicationError::Node(err)),
        };

        self.attempt.store(0, Ordering::SeqCst);
        let caught_up = pulled_count < self.config.pull_batch_size as u64;
        self.set_state(if caught_up { FollowerState::Live } else { FollowerState::CatchingUp });

        debug!(
            database_id = %self.database_id,
            accepted = apply_result.accepted,
            new_position = apply_result.new_position,
            "replication step applied entries"
        );

        Ok(PullOutcome {
            accepted: apply_result.accepted,
            new_position: apply_result.new_position,
            caught_up,
        })
    }

    fn handle_failure(&self, err: ReplicationError) -> ReplicationResult<PullOutcome> {
        if err.is_fatal() {
            error!(database_id = %self.database_id, error = %err, "replication faulted");
            self.set_state(FollowerState::Faulted { reason: err.to_string() });
            return Err(err);
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if !err.is_retryable() || self.config.retry.exhausted(attempt) {
            error!(
                database_id = %self.database_id,
                attempt,
                error = %err,
                "replication retry budget exhausted"
            );
            self.set_state(FollowerState::Faulted { reason: err.to_string() });
            return Err(err);
        }

        warn!(database_id = %self.database_id, attempt, error = %err, "replication step failed, will retry");
        Err(err)
    }

    /// Runs [`Coordinator::step`] in a loop until `shutdown` fires or the
    /// database becomes `faulted`. Sleeps for the retry delay after a
    /// failed step, or [`ReplicationConfig::poll_interval`] after a step
    /// that caught up with the primary.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(database_id = %self.database_id, "replication coordinator starting");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.step().await {
                Ok(outcome) if outcome.caught_up => self.config.poll_interval,
                Ok(_) => std::time::Duration::ZERO,
                Err(err) if !err.is_fatal() => {
                    let attempt = self.attempt.load(Ordering::SeqCst);
                    self.config.retry.delay_for_attempt(attempt)
                }
                Err(_) => break,
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(database_id = %self.database_id, state = ?self.state(), "replication coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use node_codec::Value;
    use node_core::NodeError;

    use super::*;
    use crate::transport::MockTransport;

    struct FakeReplica {
        position: std::sync::atomic::AtomicU64,
        fail_with: RwLock<Option<NodeError>>,
    }

    impl FakeReplica {
        fn new() -> Self {
            Self {
                position: std::sync::atomic::AtomicU64::new(0),
                fail_with: RwLock::new(None),
            }
        }
    }

    impl ReplicaHandle for FakeReplica {
        fn current_position(&self, _database_id: DatabaseId) -> NodeResult<u64> {
            Ok(self.position.load(Ordering::SeqCst))
        }

        fn apply_entries(&self, _database_id: DatabaseId, entries: &[WalEntry]) -> NodeResult<ApplyResult> {
            if let Some(err) = self.fail_with.write().take() {
                return Err(err);
            }
            let accepted = entries.len() as u64;
            let new_position = self.position.fetch_add(accepted, Ordering::SeqCst) + accepted;
            Ok(ApplyResult { accepted, new_position })
        }
    }

    fn sample_wire_entry(position: u64) -> WalEntryWire {
        let entry = WalEntry::new(position, "INSERT INTO t VALUES (1)".to_string(), vec![Value::Integer(1)], 1000, [0u8; 32]).unwrap();
        WalEntryWire::from_entry(&entry).unwrap()
    }

    #[tokio::test]
    async fn step_transitions_to_live_when_caught_up() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(replication_protocol::PullResponse {
            entries: vec![sample_wire_entry(1)],
            current_position: 1,
        }));
        let replica = Arc::new(FakeReplica::new());
        let coordinator = Coordinator::new(DatabaseId::new(), transport, replica, ReplicationConfig::default());

        let outcome = coordinator.step().await.unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(coordinator.state(), FollowerState::Live);
        assert_eq!(coordinator.lag(), 0);
    }

    #[tokio::test]
    async fn lag_reflects_gap_behind_a_pull_batch_limit() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(replication_protocol::PullResponse {
            entries: vec![sample_wire_entry(1)],
            current_position: 10,
        }));
        let replica = Arc::new(FakeReplica::new());
        let coordinator = Coordinator::new(DatabaseId::new(), transport, replica, ReplicationConfig::default());

        coordinator.step().await.unwrap();
        assert_eq!(coordinator.lag(), 9);
    }

    #[tokio::test]
    async fn hash_chain_broken_faults_immediately() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(replication_protocol::PullResponse {
            entries: vec![sample_wire_entry(1)],
            current_position: 1,
        }));
        let replica = Arc::new(FakeReplica::new());
        *replica.fail_with.write() = Some(NodeError::HashChainBroken {
            database_id: "db".to_string(),
            position: 1,
        });
        let coordinator = Coordinator::new(DatabaseId::new(), transport, replica, ReplicationConfig::default());

        let result = coordinator.step().await;
        assert!(result.is_err());
        assert!(matches!(coordinator.state(), FollowerState::Faulted { .. }));
    }

    #[tokio::test]
    async fn faulted_coordinator_refuses_further_steps() {
        let transport = Arc::new(MockTransport::new());
        let replica = Arc::new(FakeReplica::new());
        let coordinator = Coordinator::new(DatabaseId::new(), transport, replica, ReplicationConfig::default());
        coordinator.set_state(FollowerState::Faulted { reason: "boom".to_string() });

        let result = coordinator.step().await;
        assert!(matches!(result, Err(ReplicationError::Faulted { .. })));
    }
}
