//! `node serve` (spec.md §4.8, §6): boots a node, wires in the optional
//! relay, rate limiter, and follower replication, and serves HTTP until
//! killed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http_adapter::{AppState, HttpConfig, HttpServer, ReplicationLagSource};
use node_core::{CreateDatabaseRequest, DatabaseId, EncryptionMode, Node, NodeConfig, ReplicationPolicy};
use rate_limiter::{
    init_rate_limiter, DatabaseStore, LruStore, RateLimiter, RateLimiterConfig, RateLimiting, Tier,
};
use relay_store::{RelayConfig, RelayServerState, RelayStore, SubscriberRegistry};
use replication_engine::{Coordinator, HttpTransport, ReplicationConfig};
use replication_server::{ReplicationServerState, ServerConfig};

use crate::error::{CliError, CliResult};
use crate::identity::NodeIdentity;

/// Flags for `node serve`, collected by `main` from [`clap`] and passed
/// through as a plain struct so this module stays test-friendly without
/// depending on `clap` types directly.
pub struct ServeArgs {
    pub data_dir: Option<PathBuf>,
    pub bind: SocketAddr,
    pub cors_origins: Vec<String>,
    pub relay: bool,
    pub rate_limit_max: Option<u64>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_database_backed: bool,
    pub replica_of: Option<String>,
    pub replicate_database: Option<String>,
    pub peer_auth_secret: Option<String>,
}

struct CoordinatorLagSource {
    coordinators: Vec<(String, Arc<Coordinator<HttpTransport, Node>>)>,
}

impl ReplicationLagSource for CoordinatorLagSource {
    fn lag_snapshot(&self) -> Vec<(String, u64)> {
        self.coordinators.iter().map(|(name, c)| (name.clone(), c.lag())).collect()
    }
}

fn build_rate_limiter(node: &Arc<Node>, args: &ServeArgs) -> CliResult<Option<Arc<dyn RateLimiting>>> {
    let Some(max_requests) = args.rate_limit_max else {
        return Ok(None);
    };
    let config = RateLimiterConfig::new(Tier::new(max_requests, args.rate_limit_window_ms));

    let limiter: Arc<dyn RateLimiting> = if args.rate_limit_database_backed {
        let database_id = node.create_database(CreateDatabaseRequest {
            name: "ratelimit".to_string(),
            schema: rate_limiter::SCHEMA.to_string(),
            encryption_mode: EncryptionMode::None,
            replication: ReplicationPolicy::default(),
        })?;
        Arc::new(RateLimiter::new(DatabaseStore::new(node.clone(), database_id), config))
    } else {
        Arc::new(RateLimiter::new(LruStore::new(10_000, 60_000), config))
    };

    init_rate_limiter(limiter.clone());
    Ok(Some(limiter))
}

fn build_relay(node: &Arc<Node>) -> CliResult<(Arc<RelayServerState>, RelayConfig)> {
    let config = RelayConfig::new();
    let subscribers = Arc::new(SubscriberRegistry::new(config.max_subscribers));
    let store = RelayStore::open(node.clone(), config.clone(), subscribers)?;
    Ok((Arc::new(RelayServerState::new(Arc::new(store), config.clone())), config))
}

/// Starts one follower coordinator for `args.replicate_database` against
/// `args.replica_of`, if both are set. A real fleet typically replicates
/// more than one database; this CLI wires exactly the one pair a single
/// `--replica-of`/`--replicate-database` invocation names; running
/// several node-level processes (or extending this to accept repeated
/// `--replicate` pairs) covers more, and is noted as a simplification in
/// this repo's design ledger rather than built out here.
///
/// Returns the lag source for `/metrics` plus the shutdown sender the
/// caller must hold until it wants the coordinator's pull loop to stop —
/// dropping the sender early would close the watch channel out from under
/// [`Coordinator::run`], which reads a closed channel as a spurious wakeup
/// rather than a shutdown request.
fn start_replication(
    node: &Arc<Node>,
    args: &ServeArgs,
) -> CliResult<Option<(CoordinatorLagSource, tokio::sync::watch::Sender<bool>)>> {
    let (Some(primary_url), Some(database_id)) = (&args.replica_of, &args.replicate_database) else {
        return Ok(None);
    };
    let database_id = DatabaseId::parse(database_id)
        .map_err(|err| CliError::Config(format!("malformed --replicate-database {database_id}: {err}")))?;

    let transport = Arc::new(HttpTransport::new(primary_url.clone(), Duration::from_secs(30))?);
    let coordinator = Arc::new(Coordinator::new(database_id, transport, node.clone(), ReplicationConfig::default()));

    let run_coordinator = coordinator.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        run_coordinator.run(shutdown_rx).await;
    });

    tracing::info!(%database_id, primary = %primary_url, "started follower replication");
    Ok(Some((
        CoordinatorLagSource {
            coordinators: vec![(database_id.to_string(), coordinator)],
        },
        shutdown_tx,
    )))
}

/// Runs `node serve` to completion (until the process receives Ctrl-C or
/// the listener errors).
pub async fn run(args: ServeArgs) -> CliResult<()> {
    let role = if args.replica_of.is_some() { "replica" } else { "primary" };
    let identity = NodeIdentity::load_or_create(args.data_dir.as_deref(), role)?;

    let mut config = NodeConfig::new();
    if let Some(dir) = &args.data_dir {
        config = config.data_dir(dir.clone());
    }
    let node = Arc::new(Node::with_id(config, identity.node_id));

    let discovered = node.discover_databases()?;
    node.start();
    tracing::info!(node_id = %node.id(), %discovered, "node started");

    let relay = if args.relay { Some(build_relay(&node)?) } else { None };
    let rate_limiter = build_rate_limiter(&node, &args)?;
    let replication = start_replication(&node, &args)?;
    let (lag_source, replication_shutdown) = match replication {
        Some((source, tx)) => (Some(source), Some(tx)),
        None => (None, None),
    };

    let replication_state = Arc::new(ReplicationServerState::new(
        node.clone(),
        args.peer_auth_secret
            .clone()
            .map(|secret| ServerConfig::default().with_auth(secret.into_bytes()))
            .unwrap_or_default(),
    ));

    let app_state = Arc::new(AppState::new(
        node.clone(),
        relay.as_ref().map(|(state, _)| state.clone()),
        rate_limiter,
        lag_source.map(|source| Arc::new(source) as Arc<dyn ReplicationLagSource>),
    ));

    let http_config = HttpConfig::new(args.bind).with_cors_origins(args.cors_origins);
    let server = HttpServer::new(app_state, &http_config, Some(replication_state), relay.map(|(state, _)| state));

    tokio::select! {
        result = server.start() => {
            result.map_err(CliError::Io)?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            if let Some(tx) = replication_shutdown {
                let _ = tx.send(true);
            }
            node.stop();
        }
    }
    Ok(())
}
