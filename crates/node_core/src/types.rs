//! Core identifier and enum types shared across the node.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique identifier for a database hosted on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseId(pub Uuid);

impl DatabaseId {
    /// Generates a new random database id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a database id from its string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for DatabaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for this node, persisted in `node.json` across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generates a new random node id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A database's position in its own write-ahead log.
///
/// Monotonically increasing per database, starting at 1 for the first
/// committed write. `0` denotes an empty database with no WAL entries yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WalPosition(pub u64);

impl WalPosition {
    /// The position of an empty database.
    pub const ZERO: Self = Self(0);

    /// Returns the next position after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw position value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encryption posture of a database. Inert metadata in the core beyond
/// [`EncryptionMode::AtRest`], which selects `node_storage`'s
/// `EncryptedBackend` for the database's storage files; `TeeEncrypted`
/// is surfaced to a separate TEE execution path outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionMode {
    /// No encryption at rest.
    #[default]
    None,
    /// Database files are encrypted at rest with a node-held key.
    AtRest,
    /// Database execution happens inside a trusted execution environment;
    /// out of core scope beyond this tag.
    TeeEncrypted,
}

impl EncryptionMode {
    /// Parses the wire/config string form (`"none"`, `"at_rest"`,
    /// `"tee_encrypted"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "at_rest" => Some(Self::AtRest),
            "tee_encrypted" => Some(Self::TeeEncrypted),
            _ => None,
        }
    }

    /// Returns the wire/config string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AtRest => "at_rest",
            Self::TeeEncrypted => "tee_encrypted",
        }
    }
}

/// A database's role with respect to replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseRole {
    /// This node is authoritative for the database; it accepts writes.
    #[default]
    Primary,
    /// This node pulls the database's WAL from a primary and applies it.
    Replica,
}

impl DatabaseRole {
    /// Returns the wire/config string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
        }
    }
}

/// Replication policy requested for a database at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicationPolicy {
    /// Number of replica copies desired.
    pub replica_count: u32,
    /// Region hint for replica placement.
    pub region: Option<String>,
}

/// Lifecycle status of the [`crate::Node`] facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeStatus {
    /// Constructed but not yet serving requests.
    #[default]
    Pending,
    /// Serving requests.
    Active,
    /// Draining in-flight work before shutdown completes.
    Exiting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_position_next() {
        assert_eq!(WalPosition::ZERO.next(), WalPosition(1));
        assert_eq!(WalPosition(5).next().as_u64(), 6);
    }

    #[test]
    fn encryption_mode_roundtrip() {
        for mode in [
            EncryptionMode::None,
            EncryptionMode::AtRest,
            EncryptionMode::TeeEncrypted,
        ] {
            assert_eq!(EncryptionMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(EncryptionMode::parse("bogus"), None);
    }

    #[test]
    fn database_id_display_roundtrip() {
        let id = DatabaseId::new();
        let parsed = DatabaseId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
