use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use cqm_core::{CoreConfig, resolve_data_dir};

/// Main entry point for the CQM workbench
///
/// Serves the REST API, including the Swagger UI at `/swagger-ui`.
///
/// # Environment Variables
/// - `CQM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CQM_DATA_DIR`: Directory holding measures and test cases (default: "cqm_data")
///
/// A `.env` file in the working directory is loaded first when present. The data directory is
/// created on startup if it does not exist yet.
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If server startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cqm_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("cqm_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CQM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = resolve_data_dir(std::env::var("CQM_DATA_DIR").ok());
    if !data_dir.exists() {
        tracing::info!("creating data directory {}", data_dir.display());
        std::fs::create_dir_all(&data_dir)?;
    }
    let cfg = Arc::new(CoreConfig::new(data_dir)?);

    tracing::info!("++ Starting CQM REST on {}", rest_addr);

    let app = router(AppState::new(cfg));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
