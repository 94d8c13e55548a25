//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `cqm-run` binary also loads `.env`
//! before serving the same router.

use cqm_core::{resolve_data_dir, CoreConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};

/// Main entry point for the CQM REST API server
///
/// # Environment Variables
/// - `CQM_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CQM_DATA_DIR`: Directory holding measures and test cases (default: "cqm_data")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the data directory does not exist,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("cqm_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CQM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = resolve_data_dir(std::env::var("CQM_DATA_DIR").ok());
    if !data_dir.exists() {
        anyhow::bail!("CQM data directory does not exist: {}", data_dir.display());
    }
    let cfg = Arc::new(CoreConfig::new(data_dir)?);

    tracing::info!("-- Starting CQM REST API on {}", addr);

    let app = router(AppState::new(cfg));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
