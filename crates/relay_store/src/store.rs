//! The relay's write-through message store (spec.md §4.6): durable
//! persistence backed by a Node-hosted database, an in-memory cache for
//! fast id-uniqueness checks, a pending-per-recipient queue for offline
//! delivery, and fan-out to live subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use node_codec::Value;
use node_core::{CreateDatabaseRequest, EncryptionMode, ExecuteRequest, Node, ReplicationPolicy};
use parking_lot::RwLock;

use crate::config::RelayConfig;
use crate::envelope::{EncryptedContent, MessageEnvelope};
use crate::error::{RelayError, RelayResult};
use crate::subscriber::{ServerFrame, SubscriberRegistry};

const SCHEMA: &str = "
CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    from_address TEXT NOT NULL,
    to_address TEXT NOT NULL,
    ciphertext TEXT NOT NULL,
    ephemeral_public_key TEXT NOT NULL,
    nonce TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    signature TEXT,
    cid TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    is_read INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_messages_to ON messages(to_address);
";

const DATABASE_NAME: &str = "relay";

/// The result of a successful [`RelayStore::submit`] (spec.md §6, `POST
/// /send`'s `200` response).
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The envelope's id, echoed back as `messageId`.
    pub message_id: String,
    /// The envelope's content identifier.
    pub cid: String,
    /// The envelope's claimed timestamp.
    pub timestamp: u64,
    /// Whether the message was delivered live (a subscriber was online).
    pub delivered: bool,
}

/// Write-through store for relay messages: every accepted envelope is
/// durable before [`RelayStore::submit`] returns, with an in-memory cache
/// kept consistent alongside it.
pub struct RelayStore {
    node: Arc<Node>,
    database_id: node_core::DatabaseId,
    config: RelayConfig,
    subscribers: Arc<SubscriberRegistry>,
    cache: RwLock<HashMap<String, MessageEnvelope>>,
    pending: RwLock<HashMap<String, Vec<String>>>,
}

impl RelayStore {
    /// Opens (creating if absent) the relay's Node-hosted database and
    /// returns an empty store backed by it.
    pub fn open(node: Arc<Node>, config: RelayConfig, subscribers: Arc<SubscriberRegistry>) -> RelayResult<Self> {
        let database_id = match node.create_database(CreateDatabaseRequest {
            name: DATABASE_NAME.to_string(),
            schema: SCHEMA.to_string(),
            encryption_mode: EncryptionMode::None,
            replication: ReplicationPolicy::default(),
        }) {
            Ok(id) => id,
            Err(node_core::NodeError::NameTaken { .. }) => {
                node.list_databases()
                    .into_iter()
                    .find(|info| info.name == DATABASE_NAME)
                    .map(|info| info.id)
                    .ok_or_else(|| RelayError::Node(node_core::NodeError::internal("relay database vanished")))?
            }
            Err(err) => return Err(RelayError::Node(err)),
        };

        Ok(Self {
            node,
            database_id,
            config,
            subscribers,
            cache: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        })
    }

    /// The relay's subscriber registry, shared with the WebSocket handler.
    #[must_use]
    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// Total envelopes queued across every recipient awaiting delivery.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.read().values().map(Vec::len).sum()
    }

    /// Ingests one envelope end to end (spec.md §4.6 steps 1-7): validates,
    /// enforces freshness and id uniqueness, persists durably and in the
    /// cache, and delivers live or enqueues for later.
    pub fn submit(&self, envelope: MessageEnvelope, now_ms: u64) -> RelayResult<SubmitOutcome> {
        envelope.validate(&self.config, now_ms)?;

        if self.cache.read().contains_key(&envelope.id) {
            return Err(RelayError::Duplicate);
        }
        if self.find_by_id(&envelope.id)?.is_some() {
            return Err(RelayError::Duplicate);
        }

        let cid = envelope.cid();
        self.persist(&envelope, &cid)?;
        self.cache.write().insert(envelope.id.clone(), envelope.clone());

        let delivered = self.subscribers.send(&envelope.to, ServerFrame::Message { envelope: envelope.clone() });
        if delivered {
            self.mark_delivered(&envelope.id)?;
            self.subscribers.send(
                &envelope.from,
                ServerFrame::DeliveryReceipt { message_id: envelope.id.clone(), timestamp: now_ms },
            );
        } else {
            self.pending.write().entry(envelope.to.clone()).or_default().push(envelope.id.clone());
        }

        Ok(SubmitOutcome { message_id: envelope.id, cid, timestamp: envelope.timestamp, delivered })
    }

    /// Returns every message addressed to `address`, most recent last,
    /// for the authenticated mailbox-read endpoint.
    pub fn mailbox(&self, address: &str) -> RelayResult<Vec<MessageEnvelope>> {
        let sql = "SELECT id, from_address, to_address, ciphertext, ephemeral_public_key, nonce, \
                   timestamp, signature, delivered, is_read FROM messages WHERE to_address = ? ORDER BY timestamp ASC";
        let result = self.execute_read(sql, vec![Value::Text(address.to_string())])?;
        result.rows.iter().map(row_to_envelope).collect()
    }

    /// Returns one message by id, checking the cache first.
    pub fn message(&self, id: &str) -> RelayResult<MessageEnvelope> {
        self.find_by_id(id)?.ok_or(RelayError::NotFound)
    }

    /// Marks a message read (`POST /read/:id`), returning its envelope so
    /// the caller can build a read receipt.
    pub fn mark_read(&self, id: &str) -> RelayResult<MessageEnvelope> {
        let envelope = self.message(id)?;
        let sql = "UPDATE messages SET is_read = 1 WHERE id = ?";
        self.execute_write(sql, vec![Value::Text(id.to_string())])?;
        Ok(envelope)
    }

    /// Replays `address`'s pending (never-delivered) messages over its
    /// freshly authenticated subscription, marking each delivered as it's
    /// handed back (spec.md §4.6, delivery semantics).
    pub fn replay_pending(&self, address: &str) -> RelayResult<Vec<MessageEnvelope>> {
        let ids: Vec<String> = self.pending.write().remove(address).unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(envelope) = self.find_by_id(&id)? {
                self.mark_delivered(&id)?;
                out.push(envelope);
            }
        }
        Ok(out)
    }

    fn find_by_id(&self, id: &str) -> RelayResult<Option<MessageEnvelope>> {
        if let Some(envelope) = self.cache.read().get(id).cloned() {
            return Ok(Some(envelope));
        }
        let sql = "SELECT id, from_address, to_address, ciphertext, ephemeral_public_key, nonce, \
                   timestamp, signature, delivered, is_read FROM messages WHERE id = ?";
        let result = self.execute_read(sql, vec![Value::Text(id.to_string())])?;
        match result.rows.first() {
            Some(row) => Ok(Some(row_to_envelope(row)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, envelope: &MessageEnvelope, cid: &str) -> RelayResult<()> {
        let sql = "INSERT INTO messages \
            (id, from_address, to_address, ciphertext, ephemeral_public_key, nonce, timestamp, signature, cid) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let signature = envelope.signature.clone().map_or(Value::Null, Value::Text);
        self.execute_write(
            sql,
            vec![
                Value::Text(envelope.id.clone()),
                Value::Text(envelope.from.clone()),
                Value::Text(envelope.to.clone()),
                Value::Text(envelope.encrypted_content.ciphertext.clone()),
                Value::Text(envelope.encrypted_content.ephemeral_public_key.clone()),
                Value::Text(envelope.encrypted_content.nonce.clone()),
                Value::Integer(envelope.timestamp as i64),
                signature,
                Value::Text(cid.to_string()),
            ],
        )?;
        Ok(())
    }

    fn mark_delivered(&self, id: &str) -> RelayResult<()> {
        self.execute_write("UPDATE messages SET delivered = 1 WHERE id = ?", vec![Value::Text(id.to_string())])?;
        Ok(())
    }

    fn execute_write(&self, sql: &str, params: Vec<Value>) -> RelayResult<node_core::QueryResult> {
        let response = self.node.execute(ExecuteRequest {
            database_id: self.database_id,
            sql: sql.to_string(),
            params,
            required_wal_position: None,
        })?;
        Ok(response.result)
    }

    fn execute_read(&self, sql: &str, params: Vec<Value>) -> RelayResult<node_core::QueryResult> {
        let response = self.node.execute(ExecuteRequest {
            database_id: self.database_id,
            sql: sql.to_string(),
            params,
            required_wal_position: None,
        })?;
        Ok(response.result)
    }
}

fn row_to_envelope(row: &[Value]) -> RelayResult<MessageEnvelope> {
    let text = |value: &Value| -> RelayResult<String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(RelayError::Node(node_core::NodeError::internal("malformed relay row"))),
        }
    };
    let optional_text = |value: &Value| -> Option<String> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    };
    let integer = |value: &Value| -> RelayResult<i64> {
        match value {
            Value::Integer(n) => Ok(*n),
            _ => Err(RelayError::Node(node_core::NodeError::internal("malformed relay row"))),
        }
    };

    if row.len() < 10 {
        return Err(RelayError::Node(node_core::NodeError::internal("short relay row")));
    }

    Ok(MessageEnvelope {
        id: text(&row[0])?,
        from: text(&row[1])?,
        to: text(&row[2])?,
        encrypted_content: EncryptedContent {
            ciphertext: text(&row[3])?,
            ephemeral_public_key: text(&row[4])?,
            nonce: text(&row[5])?,
        },
        timestamp: integer(&row[6])? as u64,
        signature: optional_text(&row[7]),
    })
}

#[cfg(test)]
mod tests {
    use node_core::NodeConfig;

    use super::*;

    fn envelope(id: &str, from: &str, to: &str, timestamp: u64) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            encrypted_content: EncryptedContent {
                ciphertext: "cafe".to_string(),
                ephemeral_public_key: "pub".to_string(),
                nonce: "nonce".to_string(),
            },
            timestamp,
            signature: None,
        }
    }

    fn store() -> RelayStore {
        let node = Arc::new(Node::new(NodeConfig::default()));
        node.start();
        let registry = Arc::new(SubscriberRegistry::new(10));
        RelayStore::open(node, RelayConfig::default(), registry).unwrap()
    }

    #[test]
    fn submit_persists_and_enqueues_pending_when_offline() {
        let store = store();
        let id = uuid::Uuid::new_v4().to_string();
        let outcome = store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000).unwrap();
        assert!(!outcome.delivered);

        let mailbox = store.mailbox("0xb").unwrap();
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox[0].id, id);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = store();
        let id = uuid::Uuid::new_v4().to_string();
        store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000).unwrap();
        let result = store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000);
        assert!(matches!(result, Err(RelayError::Duplicate)));
    }

    #[test]
    fn live_subscriber_receives_delivery_and_marks_delivered() {
        let store = store();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        store.subscribers().subscribe("0xb", tx);

        let id = uuid::Uuid::new_v4().to_string();
        let outcome = store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000).unwrap();
        assert!(outcome.delivered);
        assert!(rx.try_recv().is_ok());

        let replayed = store.replay_pending("0xb").unwrap();
        assert!(replayed.is_empty(), "a delivered message should not also be pending");
    }

    #[test]
    fn replay_pending_returns_and_clears_queue() {
        let store = store();
        let id = uuid::Uuid::new_v4().to_string();
        store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000).unwrap();

        let replayed = store.replay_pending("0xb").unwrap();
        assert_eq!(replayed.len(), 1);
        assert!(store.replay_pending("0xb").unwrap().is_empty());
    }

    #[test]
    fn mark_read_updates_state_and_message_is_still_fetchable() {
        let store = store();
        let id = uuid::Uuid::new_v4().to_string();
        store.submit(envelope(&id, "0xa", "0xb", 1_000), 1_000).unwrap();
        store.mark_read(&id).unwrap();
        let fetched = store.message(&id).unwrap();
        assert_eq!(fetched.id, id);
    }

    #[test]
    fn unknown_message_is_not_found() {
        let store = store();
        assert!(matches!(store.message("missing"), Err(RelayError::NotFound)));
    }
}
