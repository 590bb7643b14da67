//! Operator CLI for a node: `serve` runs it, `db`/`wal`/`ratelimit`
//! inspect and administer it out-of-process (spec.md §6).

mod commands;
mod error;
mod identity;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::serve::ServeArgs;
use error::CliError;

/// Operator CLI for a distributed multi-tenant SQL node.
#[derive(Parser)]
#[command(name = "node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory for this node's persisted state. Omit for a fully
    /// in-memory node (databases vanish when the process exits).
    #[arg(global = true, long)]
    data_dir: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP/WebSocket traffic for this node until killed.
    Serve {
        /// Address to bind the HTTP/WS adapter to.
        #[arg(long, default_value = "0.0.0.0:7700")]
        bind: SocketAddr,

        /// Allowed CORS origin; repeat for multiple. Omit for permissive
        /// CORS.
        #[arg(long = "cors-origin")]
        cors_origin: Vec<String>,

        /// Mount the relay's `/send`, `/messages`, `/ws` routes.
        #[arg(long)]
        relay: bool,

        /// Requests allowed per window before `429`s, across every tier.
        /// Omit to run without rate limiting.
        #[arg(long)]
        rate_limit_max: Option<u64>,

        /// Rate-limit window length in milliseconds.
        #[arg(long, default_value_t = 60_000)]
        rate_limit_window_ms: u64,

        /// Share rate-limit counters in a node-hosted database instead of
        /// an in-memory store (needed when several nodes share one limit).
        #[arg(long)]
        rate_limit_database_backed: bool,

        /// Base URL of the primary to pull WAL entries from (e.g.
        /// `http://primary:7700`). Requires `--replicate-database`.
        #[arg(long)]
        replica_of: Option<String>,

        /// Id of the database to replicate from `--replica-of`.
        #[arg(long)]
        replicate_database: Option<String>,

        /// Shared secret for replication peer authentication. Omit only
        /// behind a trusted network.
        #[arg(long)]
        peer_auth_secret: Option<String>,
    },

    /// Database lifecycle: create, list, inspect, delete.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Inspect or verify a database's write-ahead log directly.
    Wal {
        #[command(subcommand)]
        action: WalAction,
    },

    /// Exercise the rate limiter from the command line.
    RateLimit {
        #[command(subcommand)]
        action: RateLimitAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Create a database, running `--schema` as its first WAL entries.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        schema: String,
        #[arg(long, default_value = "none")]
        encryption: String,
    },
    /// List every database this node hosts.
    List,
    /// Show one database's summary info.
    Inspect {
        #[arg(long)]
        id: String,
    },
    /// Delete a database and its on-disk files.
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum WalAction {
    /// Print a database's WAL entries.
    Dump {
        #[arg(long)]
        database: String,
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long, default_value_t = 1000)]
        limit: usize,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Walk a database's hash chain end to end, reporting the first break.
    Verify {
        #[arg(long)]
        database: String,
    },
}

#[derive(Subcommand)]
enum RateLimitAction {
    /// Run one `check` against a fresh in-memory limiter.
    Check {
        #[arg(long)]
        key: String,
        #[arg(long)]
        max: u64,
        #[arg(long, default_value_t = 60_000)]
        window_ms: u64,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose { EnvFilter::new("debug") } else { EnvFilter::new("info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve {
            bind,
            cors_origin,
            relay,
            rate_limit_max,
            rate_limit_window_ms,
            rate_limit_database_backed,
            replica_of,
            replicate_database,
            peer_auth_secret,
        } => {
            commands::serve::run(ServeArgs {
                data_dir: cli.data_dir,
                bind,
                cors_origins: cors_origin,
                relay,
                rate_limit_max,
                rate_limit_window_ms,
                rate_limit_database_backed,
                replica_of,
                replicate_database,
                peer_auth_secret,
            })
            .await
        }
        Commands::Db { action } => match action {
            DbAction::Create { name, schema, encryption } => {
                commands::db::create(cli.data_dir.as_deref(), &name, &schema, &encryption)
            }
            DbAction::List => commands::db::list(cli.data_dir.as_deref()),
            DbAction::Inspect { id } => commands::db::inspect(cli.data_dir.as_deref(), &id),
            DbAction::Delete { id } => commands::db::delete(cli.data_dir.as_deref(), &id),
        },
        Commands::Wal { action } => {
            let data_dir = cli.data_dir.ok_or_else(|| CliError::Config("--data-dir is required for wal commands".to_string()))?;
            match action {
                WalAction::Dump { database, from, limit, format } => {
                    commands::wal::dump(&data_dir, &database, from, limit, &format)
                }
                WalAction::Verify { database } => commands::wal::verify(&data_dir, &database),
            }
        }
        Commands::RateLimit { action } => match action {
            RateLimitAction::Check { key, max, window_ms } => commands::ratelimit::check(&key, max, window_ms),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::from(err.exit_code())
        }
    }
}
