//! Permscope REST API Server
//!
//! Run with: cargo run --features server --bin permscope-server
//!
//! Configuration comes from the environment (see `permscope::config`). Log verbosity follows
//! `RUST_LOG`, defaulting to `permscope=info,tower_http=info`.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use permscope::server::{router, AppState};
use permscope::{Config, Controller, LmdbStore};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("permscope=info,tower_http=info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let store = Arc::new(LmdbStore::from_config(&config)?);
    let controller = Controller::from_config(store, &config);
    let app = router(AppState::new(controller));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, db = %config.db_path, "permscope server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
