//! HTTP server exposing `/health`, `/email` and `/bulk-email`.

use std::sync::Arc;

use mailshot::server::{self, ServerConfig};
use mailshot::Dispatcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let dispatcher = Dispatcher::smtp().config(config.dispatch);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "mailshot-server listening");

    axum::serve(listener, server::router(Arc::new(dispatcher))).await?;
    Ok(())
}
