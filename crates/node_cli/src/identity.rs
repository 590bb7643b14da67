//! Node identity file (spec.md §6: `<dataDir>/node.json`, "node identity
//! and role"): written once at a persistent node's first boot, read back
//! on every later boot so a restarting process keeps the same [`NodeId`]
//! instead of generating a fresh one and orphaning its `databases/`
//! directory (spec.md §6's persisted layout only means anything across
//! restarts if the node's own identity survives with it).

use std::path::Path;

use node_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

const FILE_NAME: &str = "node.json";

/// `{nodeId, role, createdAt}`, per spec.md §10.11's supplemented shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    pub role: String,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

impl NodeIdentity {
    fn fresh(role: &str) -> Self {
        Self {
            node_id: NodeId::new(),
            role: role.to_string(),
            created_at: now_ms(),
        }
    }

    /// Reads `<data_dir>/node.json` if present, otherwise generates and
    /// persists a fresh identity. A data-dir-less (fully in-memory) node
    /// always gets a fresh identity with nothing written to disk.
    pub fn load_or_create(data_dir: Option<&Path>, role: &str) -> CliResult<Self> {
        let Some(data_dir) = data_dir else {
            return Ok(Self::fresh(role));
        };

        let path = data_dir.join(FILE_NAME);
        if path.exists() {
            let bytes = std::fs::read(&path)?;
            let identity: Self = serde_json::from_slice(&bytes)
                .map_err(|err| CliError::Config(format!("corrupt {}: {err}", path.display())))?;
            return Ok(identity);
        }

        let identity = Self::fresh(role);
        identity.write(data_dir)?;
        Ok(identity)
    }

    fn write(&self, data_dir: &Path) -> CliResult<()> {
        std::fs::create_dir_all(data_dir)?;
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| CliError::Config(format!("failed to encode node identity: {err}")))?;
        std::fs::write(data_dir.join(FILE_NAME), bytes)?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
