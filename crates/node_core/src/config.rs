//! Node-wide configuration.

use std::path::PathBuf;

/// Configuration for opening or creating a [`crate::Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for this node's persisted state (`databases/`,
    /// `node.json`). `None` means every database is in-memory-only.
    pub data_dir: Option<PathBuf>,

    /// Whether to fsync the WAL file after every append (safer, slower).
    pub sync_on_commit: bool,

    /// Whether `DatabaseManager::get`/`delete` return `NotFound` for an
    /// absent database (`true`, strict) or tolerate it silently (`false`).
    /// See spec.md §4.3.
    pub strict_not_found: bool,

    /// Maximum number of WAL entries a single `readRange` call returns.
    pub max_wal_range: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_on_commit: true,
            strict_not_found: true,
            max_wal_range: 1000,
        }
    }
}

impl NodeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node's data directory, enabling on-disk persistence.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets whether to fsync the WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether absent-database lookups are strict `NotFound` errors.
    #[must_use]
    pub const fn strict_not_found(mut self, value: bool) -> Self {
        self.strict_not_found = value;
        self
    }

    /// Sets the maximum entries returned by one `readRange` call.
    #[must_use]
    pub const fn max_wal_range(mut self, value: usize) -> Self {
        self.max_wal_range = value;
        self
    }

    /// Whether this node persists to disk.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.data_dir.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NodeConfig::default();
        assert!(!config.is_persistent());
        assert!(config.sync_on_commit);
        assert!(config.strict_not_found);
    }

    #[test]
    fn builder_pattern() {
        let config = NodeConfig::new()
            .data_dir("/tmp/node")
            .sync_on_commit(false)
            .max_wal_range(50);

        assert!(config.is_persistent());
        assert!(!config.sync_on_commit);
        assert_eq!(config.max_wal_range, 50);
    }
}
