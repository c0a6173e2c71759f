// crates/server/src/main.rs
//! Jobdeck server binary.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use jobdeck_server::{create_app_with_state, init_metrics, AppState, Config};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,jobdeck_server=info,jobdeck=info";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    let startup_start = Instant::now();
    init_metrics();

    eprintln!("\n  jobdeck v{}\n", env!("CARGO_PKG_VERSION"));

    let addr = config.addr();
    let state = AppState::new(config);
    if let Some(path) = &state.config.backfill_file {
        tracing::info!(path = %path.display(), "backfill source configured");
    }
    let app = create_app_with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    eprintln!(
        "  \u{2713} Ready in {}ms\n  \u{2192} http://{}\n",
        startup_start.elapsed().as_millis(),
        addr
    );
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
