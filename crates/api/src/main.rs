use anyhow::Result;
use occacia_api::{build_app, ApiConfig};
use occacia_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("occacia_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();
    let persistent = config.database_url.is_some();

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, persistent, "occacia planning api started");

    axum::serve(listener, app).await?;
    Ok(())
}
