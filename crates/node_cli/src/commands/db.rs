//! `node db create|list|inspect|delete` (spec.md §4.3): short-lived
//! one-shot operations against a node's persisted databases.

use std::path::Path;

use node_core::{CreateDatabaseRequest, DatabaseId, EncryptionMode, Node, NodeConfig, ReplicationPolicy};

use crate::error::{CliError, CliResult};
use crate::identity::NodeIdentity;

fn open_node(data_dir: Option<&Path>) -> CliResult<Node> {
    let identity = NodeIdentity::load_or_create(data_dir, "primary")?;
    let mut config = NodeConfig::new();
    if let Some(dir) = data_dir {
        config = config.data_dir(dir);
    }
    let node = Node::with_id(config, identity.node_id);
    node.start();
    let discovered = node.discover_databases()?;
    tracing::debug!(discovered, "rediscovered existing databases");
    Ok(node)
}

fn parse_id(raw: &str) -> CliResult<DatabaseId> {
    DatabaseId::parse(raw).map_err(|err| CliError::Config(format!("malformed database id {raw}: {err}")))
}

/// `node db create --name NAME [--schema SQL] [--encryption MODE]`.
pub fn create(data_dir: Option<&Path>, name: &str, schema: &str, encryption: &str) -> CliResult<()> {
    let node = open_node(data_dir)?;
    let encryption_mode = EncryptionMode::parse(encryption)
        .ok_or_else(|| CliError::Config(format!("unknown encryption mode {encryption}")))?;

    let id = node.create_database(CreateDatabaseRequest {
        name: name.to_string(),
        schema: schema.to_string(),
        encryption_mode,
        replication: ReplicationPolicy::default(),
    })?;

    println!("created database {id} ({name})");
    Ok(())
}

/// `node db list`.
pub fn list(data_dir: Option<&Path>) -> CliResult<()> {
    let node = open_node(data_dir)?;
    let mut databases = node.list_databases();
    databases.sort_by(|a, b| a.name.cmp(&b.name));

    if databases.is_empty() {
        println!("no databases");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<10} {:<8} wal", "id", "name", "role", "enc");
    for database in databases {
        println!(
            "{:<38} {:<20} {:<10} {:<8} {}",
            database.id,
            database.name,
            database.role.as_str(),
            database.encryption_mode.as_str(),
            database.wal_position
        );
    }
    Ok(())
}

/// `node db inspect --id ID`.
pub fn inspect(data_dir: Option<&Path>, id: &str) -> CliResult<()> {
    let node = open_node(data_dir)?;
    let id = parse_id(id)?;
    let info = node.get_database(id)?;

    println!("id:             {}", info.id);
    println!("name:           {}", info.name);
    println!("role:           {}", info.role.as_str());
    println!("encryptionMode: {}", info.encryption_mode.as_str());
    println!("walPosition:    {}", info.wal_position);
    println!("createdAt:      {}", info.created_at);
    Ok(())
}

/// `node db delete --id ID`.
pub fn delete(data_dir: Option<&Path>, id: &str) -> CliResult<()> {
    let node = open_node(data_dir)?;
    let id = parse_id(id)?;
    node.delete_database(id)?;
    println!("deleted database {id}");
    Ok(())
}
