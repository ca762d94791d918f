use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use mochi_gateway::bootstrap::build_state;
use mochi_gateway::cli::{Cli, Command};
use mochi_gateway::{api, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config();

    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Doctor => doctor(config).await,
        Command::Version => {
            println!("mochi-server {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(config: mochi_domain::Config) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mochi starting");

    let addr = format!("{}:{}", config.host, config.port);
    let state = build_state(config).context("building application state")?;

    if !state.upstream.check_connection().await {
        tracing::warn!(
            url = %state.config.upstream_url,
            "upstream daemon is unreachable; chat requests will fail until it comes up"
        );
    }

    let app = api::router()
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "mochi listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn doctor(config: mochi_domain::Config) -> anyhow::Result<()> {
    println!("mochi-server {} doctor", env!("CARGO_PKG_VERSION"));
    println!("upstream url:      {}", config.upstream_url);
    println!("data dir:          {}", config.data_dir);

    let state: AppState = build_state(config).context("building application state")?;

    let reachable = state.upstream.check_connection().await;
    println!(
        "upstream:          {}",
        if reachable { "reachable" } else { "UNREACHABLE" }
    );
    if reachable {
        match state.upstream.list_models().await {
            Ok(models) => println!("models:            {} completion-capable", models.len()),
            Err(e) => println!("models:            error: {e}"),
        }
    }

    println!("tools:             {}", state.tools.listing().tools.len());
    let agents = state.agents.list();
    let valid = agents.iter().filter(|a| a.valid).count();
    println!("agents:            {valid} valid / {} total", agents.len());
    println!(
        "sessions dir:      {}",
        state.config.resolved_sessions_dir().display()
    );

    Ok(())
}
