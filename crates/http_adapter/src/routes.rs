//! Node-facing HTTP routes (spec.md §6): `/query`, `/batch`, `/health`,
//! `/metrics`. Mechanical dispatch onto [`node_core::Node`], converting
//! JSON parameters through [`node_codec::json`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use node_codec::json::{json_to_value, value_to_json};
use node_core::{DatabaseId, ExecuteRequest, QueryResult};
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};
use crate::state::AppState;

/// Builds the adapter's own router: `/query`, `/batch`, `/health`,
/// `/metrics`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/batch", post(batch))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(rename = "databaseId")]
    database_id: String,
    sql: String,
    #[serde(default)]
    params: Vec<serde_json::Value>,
    #[serde(rename = "requiredWalPosition")]
    required_wal_position: Option<u64>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    rows: Vec<serde_json::Value>,
    #[serde(rename = "rowsAffected")]
    rows_affected: u64,
    #[serde(rename = "lastInsertId")]
    last_insert_id: i64,
    #[serde(rename = "readOnly")]
    read_only: bool,
    #[serde(rename = "walPosition")]
    wal_position: u64,
}

fn parse_database_id(raw: &str) -> AdapterResult<DatabaseId> {
    DatabaseId::parse(raw).map_err(|_| AdapterError::ValidationError(format!("malformed databaseId: {raw}")))
}

fn params_to_values(params: &[serde_json::Value]) -> AdapterResult<Vec<node_codec::Value>> {
    params
        .iter()
        .map(|p| json_to_value(p).map_err(|err| AdapterError::ValidationError(err.to_string())))
        .collect()
}

fn rows_to_json(result: &QueryResult) -> Vec<serde_json::Value> {
    result
        .rows
        .iter()
        .map(|row| {
            let mut map = serde_json::Map::with_capacity(result.columns.len());
            for (column, value) in result.columns.iter().zip(row.iter()) {
                map.insert(column.clone(), value_to_json(value));
            }
            serde_json::Value::Object(map)
        })
        .collect()
}

async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> AdapterResult<Json<QueryResponse>> {
    let database_id = parse_database_id(&req.database_id)?;
    let params = params_to_values(&req.params)?;

    let response = state.node.execute(ExecuteRequest {
        database_id,
        sql: req.sql,
        params,
        required_wal_position: req.required_wal_position,
    })?;

    Ok(Json(QueryResponse {
        rows: rows_to_json(&response.result),
        rows_affected: response.result.rows_affected,
        last_insert_id: response.result.last_insert_id,
        read_only: response.result.read_only,
        wal_position: response.wal_position,
    }))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    #[serde(rename = "databaseId")]
    database_id: String,
    queries: Vec<BatchQuery>,
    #[serde(default)]
    transactional: bool,
}

#[derive(Debug, Deserialize)]
struct BatchQuery {
    sql: String,
    #[serde(default)]
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    results: Vec<QueryResponse>,
}

async fn batch(State(state): State<Arc<AppState>>, Json(req): Json<BatchRequest>) -> AdapterResult<Json<BatchResponse>> {
    let database_id = parse_database_id(&req.database_id)?;
    let queries = req
        .queries
        .into_iter()
        .map(|q| Ok((q.sql, params_to_values(&q.params)?)))
        .collect::<AdapterResult<Vec<_>>>()?;

    let results = state.node.batch_execute(database_id, queries, req.transactional)?;
    let wal_position = state.node.current_wal_position(database_id)?;

    let results = results
        .iter()
        .map(|result| QueryResponse {
            rows: rows_to_json(result),
            rows_affected: result.rows_affected,
            last_insert_id: result.last_insert_id,
            read_only: result.read_only,
            wal_position,
        })
        .collect();

    Ok(Json(BatchResponse { results }))
}

#[derive(Debug, Serialize)]
struct HealthStats {
    databases: usize,
    #[serde(rename = "walPositionsAppended")]
    wal_positions_appended: u64,
    #[serde(rename = "relaySubscribers")]
    relay_subscribers: usize,
    #[serde(rename = "rateLimiterStoreSize")]
    rate_limiter_store_size: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(rename = "nodeId")]
    node_id: String,
    uptime: u64,
    stats: HealthStats,
    timestamp: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let databases = state.node.list_databases();
    let wal_positions_appended = databases.iter().map(|db| db.wal_position).sum();

    Json(HealthResponse {
        status: "ok",
        node_id: state.node.id().to_string(),
        uptime: state.node.uptime_secs(),
        stats: HealthStats {
            databases: databases.len(),
            wal_positions_appended,
            relay_subscribers: state.relay.as_ref().map(|r| r.subscriber_count()).unwrap_or(0),
            rate_limiter_store_size: state
                .rate_limiter
                .as_ref()
                .and_then(|limiter| limiter.store_size().ok())
                .unwrap_or(0),
        },
        timestamp: now_ms(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let mut out = String::new();

    out.push_str("# HELP node_wal_position Current WAL position per database.\n");
    out.push_str("# TYPE node_wal_position gauge\n");
    for database in state.node.list_databases() {
        out.push_str(&format!("node_wal_position{{database=\"{}\"}} {}\n", database.name, database.wal_position));
    }

    out.push_str("# HELP node_replication_lag Positions a replica's database lags its primary.\n");
    out.push_str("# TYPE node_replication_lag gauge\n");
    if let Some(lag_source) = &state.replication_lag {
        for (database, lag) in lag_source.lag_snapshot() {
            out.push_str(&format!("node_replication_lag{{database=\"{database}\"}} {lag}\n"));
        }
    }

    let relay_subscribers = state.relay.as_ref().map(|r| r.subscriber_count()).unwrap_or(0);
    out.push_str("# HELP relay_subscribers_active Currently connected WebSocket subscribers.\n");
    out.push_str("# TYPE relay_subscribers_active gauge\n");
    out.push_str(&format!("relay_subscribers_active {relay_subscribers}\n"));

    let relay_pending = state.relay.as_ref().map(|r| r.pending_message_count()).unwrap_or(0);
    out.push_str("# HELP relay_messages_pending Envelopes queued for offline recipients.\n");
    out.push_str("# TYPE relay_messages_pending gauge\n");
    out.push_str(&format!("relay_messages_pending {relay_pending}\n"));

    out.push_str("# HELP rate_limit_denied_total Requests denied by tier since process start.\n");
    out.push_str("# TYPE rate_limit_denied_total counter\n");
    for (tier, denied) in state.denied_counters.snapshot() {
        out.push_str(&format!("rate_limit_denied_total{{tier=\"{tier}\"}} {denied}\n"));
    }

    out
}
