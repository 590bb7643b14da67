//! A narrow view over follower-side replication lag (spec.md §6,
//! `node_replication_lag`), kept as an object-safe trait so the adapter
//! does not depend on `replication_engine`'s generic `Coordinator<T, R>`.

/// Implemented by whatever owns this node's follower-side coordinators
/// (typically the CLI's `serve` command, which constructs them
/// concretely).
pub trait ReplicationLagSource: Send + Sync {
    /// One `(database label, positions behind primary)` pair per
    /// actively replicated database.
    fn lag_snapshot(&self) -> Vec<(String, u64)>;
}
