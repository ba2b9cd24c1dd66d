use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod db;
mod handlers;
mod metrics;
mod models;
mod repository;
mod ws;

use crate::config::{FileConfig, RelayConfig, ServerConfig, load_config};
use crate::db::Database;
use crate::metrics::ServerMetrics;
use crate::repository::MessageRepository;
use crate::ws::{ConnectionRegistry, RelayHandle, spawn_relay_engine};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Durable fan-out relay for a shared chat room")]
struct Cli {
    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Custom data directory (defaults to ~/.chatrelay)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Clean start - reset the message database (prompts for confirmation)
    #[arg(long)]
    reset_db: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// Server runtime configuration
    pub config: Arc<ServerConfig>,
    pub db: Arc<Database>,
    pub repository: Arc<MessageRepository>,
    /// Live set of connected clients
    pub registry: Arc<ConnectionRegistry>,
    /// Handle to the persist-then-broadcast engine
    pub relay: RelayHandle,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run_server(cli).await
}

async fn run_server(cli: Cli) -> Result<()> {
    // Setup logging
    let default_directive = if cli.debug {
        "chat_relay=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting chat relay server");

    let relay_config = RelayConfig::new(cli.data_dir.clone())?;

    // Handle database reset if requested
    if cli.reset_db && relay_config.db_path.exists() {
        println!("This will delete all stored messages!");
        print!("Are you sure? (yes/no): ");
        use std::io::{self, Write};
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim() == "yes" {
            relay_config.reset_database()?;
            println!("Database reset.");
        } else {
            println!("Cancelled.");
        }
    }

    // Layer defaults → config.toml → RELAY_* env vars, then CLI overrides
    let file_config: FileConfig = load_config(&relay_config.data_dir)
        .extract()
        .context("Failed to load configuration")?;
    let mut server_config = ServerConfig::from_file(&file_config);
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    let server_config = Arc::new(server_config);

    // Initialize database
    info!("Initializing database...");
    let db = Arc::new(Database::new(&relay_config).await?);
    let repository = Arc::new(MessageRepository::new(db.pool.clone()));

    let registry = Arc::new(ConnectionRegistry::new());
    let metrics = Arc::new(ServerMetrics::new());
    let relay = spawn_relay_engine(repository.clone(), registry.clone(), metrics.clone());

    info!(
        "Server config: history_limit={}, cors_origins={}",
        server_config.history_limit,
        if server_config.allowed_origins.is_empty() {
            "any".to_string()
        } else {
            server_config.allowed_origins.join(", ")
        }
    );

    let app_state = AppState {
        config: server_config.clone(),
        db,
        repository,
        registry,
        relay,
        metrics,
    };

    let app = build_router(app_state)
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors_layer(&server_config.allowed_origins));

    let addr = format!("{}:{}", server_config.host, server_config.port).parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Chat relay listening on http://{}", actual_addr);
    info!("  GET  /ws       - WebSocket relay connection");
    info!("  GET  /health   - Server health");
    info!("  GET  /metrics  - Metrics snapshot");

    // Create shutdown signal handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<axum::http::HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
