//! Application entrypoint and state wiring.

use std::process::ExitCode;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use certificate_ledger::config::Config;
use certificate_ledger::{routes, AppState};

const API_PREFIX: &str = "/api/v1/certificate-ledger";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "certificate_ledger=info,tower_http=info".into()
        })))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        difficulty = config.difficulty,
        bucket = %config.document_bucket,
        "starting certificate ledger"
    );

    let addr = config.listen_addr;
    let state = AppState::new(config);
    let genesis = state.ledger.latest_block();
    tracing::info!(hash = %genesis.hash, "ledger initialised with genesis block");

    let app = Router::new()
        .nest(API_PREFIX, routes::router(state))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, prefix = API_PREFIX, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("received shutdown signal");
}
