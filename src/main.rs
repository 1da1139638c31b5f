use std::sync::Arc;

use anyhow::Context;
use embroidery_digitizer::{logging, server, Config, Controller, GeminiClient};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init_tracing(&config)?;

    let client = Arc::new(GeminiClient::new(&config));
    let controller = Arc::new(Controller::new(client));
    let app = server::router(controller, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, model = %config.model, "embroidery digitizer listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
