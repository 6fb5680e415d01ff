//! Codebox server - HTTP API for sandboxed code execution.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use codebox::audit::AuditLog;
use codebox::config::load_config;
use codebox::limiter::RateLimiter;
use codebox::sandbox::ContainerExecutor;
use codebox::server::{build_router, AppState};
use tracing::info;

#[derive(Parser)]
#[command(name = "codebox-server", about = "Codebox sandboxed code execution API")]
struct Args {
    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides config)
    #[arg(long, short)]
    port: Option<u16>,

    /// Path to a config file (JSON5 or TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bollard=warn".into()),
        )
        .init();

    let args = Args::parse();

    // Load config
    let config = load_config(args.config.as_deref())?;

    // Build the executor; this verifies the Docker connection up front
    let audit = config
        .audit
        .enabled
        .then(|| AuditLog::new(config.audit.path.clone()));
    let executor = ContainerExecutor::new(&config.sandbox, audit).await?;
    info!("Sandbox executor ready");

    let limiter = RateLimiter::new(config.limiter.rate, config.limiter.window);

    let state = AppState {
        executor: Arc::new(executor),
        limiter: Arc::new(limiter),
    };
    let app = build_router(state);

    // Bind and serve
    let bind = args.bind.unwrap_or(config.server.bind);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Codebox listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
