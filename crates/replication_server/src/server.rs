//! Primary-side replication endpoints.
//!
//! `GET /wal` serves a window of a database's WAL (spec.md §6); the primary
//! never pushes, so there is no server-side pull loop here, only a
//! dispatch from query params to [`node_core::Node::get_wal_entries`].
//! `POST /wal/apply` is a thin HTTP front for [`node_core::Node::apply_wal_entries`],
//! kept here rather than only in-process so a follower reachable only over
//! HTTP can still drive an apply against its own node.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use node_core::{DatabaseId, Node};
use replication_protocol::{ApplyRequest, ApplyResponse, PullResponse, WalEntryWire};
use serde::Deserialize;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Shared state behind every route in [`router`].
pub struct ReplicationServerState {
    node: Arc<Node>,
    config: ServerConfig,
}

impl ReplicationServerState {
    /// Builds server state serving `node`'s WAL under `config`.
    #[must_use]
    pub fn new(node: Arc<Node>, config: ServerConfig) -> Self {
        Self { node, config }
    }
}

/// Builds the primary-side replication router. Every route requires a
/// valid `Authorization` header when `state.config.auth_secret` is set.
pub fn router(state: Arc<ReplicationServerState>) -> Router {
    Router::new()
        .route("/wal", get(get_wal))
        .route("/wal/apply", post(apply_wal))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    #[serde(rename = "databaseId")]
    database_id: String,
    #[serde(rename = "fromPosition")]
    from_position: u64,
    limit: usize,
}

fn check_auth(state: &ReplicationServerState, headers: &HeaderMap) -> ServerResult<()> {
    let Some(secret) = &state.config.auth_secret else {
        return Ok(());
    };
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("missing authorization header".to_string()))?;
    crate::auth::PeerAuth::new(secret.clone()).verify(header)
}

async fn get_wal(
    State(state): State<Arc<ReplicationServerState>>,
    headers: HeaderMap,
    Query(query): Query<PullQuery>,
) -> ServerResult<Json<PullResponse>> {
    check_auth(&state, &headers)?;

    let database_id = DatabaseId::parse(&query.database_id)
        .map_err(|_| ServerError::InvalidRequest("malformed databaseId".to_string()))?;
    let limit = query.limit.min(state.config.max_pull_batch).max(1);

    let range = state.node.get_wal_entries(database_id, query.from_position.max(1), limit)?;
    let entries = range
        .entries
        .iter()
        .map(WalEntryWire::from_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServerError::InvalidRequest(err.to_string()))?;

    Ok(Json(PullResponse {
        entries,
        current_position: range.current_position,
    }))
}

async fn apply_wal(
    State(state): State<Arc<ReplicationServerState>>,
    headers: HeaderMap,
    Json(request): Json<ApplyRequest>,
) -> ServerResult<Json<ApplyResponse>> {
    check_auth(&state, &headers)?;

    let entries = request
        .entries
        .iter()
        .map(WalEntryWire::to_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServerError::InvalidRequest(err.to_string()))?;

    let result = state.node.apply_wal_entries(request.database_id, &entries)?;
    Ok(Json(ApplyResponse {
        accepted: result.accepted,
        new_position: result.new_position,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use node_core::{CreateDatabaseRequest, EncryptionMode, ExecuteRequest, NodeConfig, ReplicationPolicy};
    use tower::ServiceExt;

    use super::*;

    fn make_node() -> (Arc<Node>, DatabaseId) {
        let node = Arc::new(Node::new(NodeConfig::default()));
        node.start();
        let id = node
            .create_database(CreateDatabaseRequest {
                name: "x".to_string(),
                schema: "CREATE TABLE t (v INTEGER)".to_string(),
                encryption_mode: EncryptionMode::None,
                replication: ReplicationPolicy::default(),
            })
            .unwrap();
        node.execute(ExecuteRequest {
            database_id: id,
            sql: "INSERT INTO t VALUES (1)".to_string(),
            params: vec![],
            required_wal_position: None,
        })
        .unwrap();
        (node, id)
    }

    #[tokio::test]
    async fn get_wal_without_auth_required_serves_entries() {
        let (node, id) = make_node();
        let state = Arc::new(ReplicationServerState::new(node, ServerConfig::default()));
        let app = router(state);

        let uri = format!("/wal?databaseId={id}&fromPosition=1&limit=10");
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: PullResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.current_position, 2);
    }

    #[tokio::test]
    async fn get_wal_rejects_missing_auth_when_configured() {
        let (node, id) = make_node();
        let config = ServerConfig::default().with_auth(b"shh".to_vec());
        let state = Arc::new(ReplicationServerState::new(node, config));
        let app = router(state);

        let uri = format!("/wal?databaseId={id}&fromPosition=1&limit=10");
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn get_wal_accepts_valid_peer_auth() {
        let (node, id) = make_node();
        let auth = crate::auth::PeerAuth::new(b"shh".to_vec());
        let config = ServerConfig::default().with_auth(b"shh".to_vec());
        let state = Arc::new(ReplicationServerState::new(node, config));
        let app = router(state);

        let uri = format!("/wal?databaseId={id}&fromPosition=1&limit=10");
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("authorization", auth.sign())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_database_is_404() {
        let (node, _id) = make_node();
        let state = Arc::new(ReplicationServerState::new(node, ServerConfig::default()));
        let app = router(state);

        let uri = format!("/wal?databaseId={}&fromPosition=1&limit=10", DatabaseId::new());
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
