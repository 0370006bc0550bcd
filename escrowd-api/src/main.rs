//! escrowd API server entry point

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use escrowd_api::config::ApiConfig;
use escrowd_api::routes::{router, AppState};
use escrowd_engine::broker::TestnetBroker;
use escrowd_engine::service::{EscrowService, EscrowServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ApiConfig::load().context("failed to load configuration")?;

    let engine_config = EscrowServiceConfig {
        public_base_url: config.public_base_url.clone(),
        ..EscrowServiceConfig::default()
    };
    let broker = Arc::new(TestnetBroker::new());
    let service = Arc::new(EscrowService::new(engine_config, broker));

    let app = router(AppState {
        service,
        public_base_url: config.public_base_url.clone(),
    });

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Starting server on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
