/// ORU risk API - HTTP endpoint that flags out-of-range lab results
///
/// Loads the reference table once at startup, then evaluates every uploaded
/// ORU batch against it.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use oru_risk::{router, AppState, BatchEvaluator, ReferenceTable, ServiceConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServiceConfig::load(config_path.as_deref())?;

    let table = ReferenceTable::load(&config.table_sources())?;
    let evaluator = config.configure(BatchEvaluator::new(Arc::new(table)));

    let state = AppState {
        evaluator,
        upload_field: config.upload_field.clone(),
    };
    let app = router(state, config.max_upload_bytes);

    let addr = config.bind_address()?;
    tracing::info!("ORU risk API listening on {}", addr);
    tracing::info!(
        "Expecting uploads in field '{}' (scope: {})",
        config.upload_field,
        config.observation_scope
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
