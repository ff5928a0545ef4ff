use anyhow::Result;
use mockapi::{build_router, AppState, MockConfig};
use std::env;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// - En Docker: MOCK_BIND=0.0.0.0:8080
/// - Para apuntar el cliente aquí: PIAPI_BASE_URL=http://localhost:8080
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mockapi=debug,tower_http=info".into()),
        )
        .init();

    let bind = env::var("MOCK_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = MockConfig::from_env();
    info!(
        "mock config: auth={} pending_polls={} processing_polls={} models={:?}",
        config.api_key.is_some(),
        config.pending_polls,
        config.processing_polls,
        config.models
    );

    let app = build_router(AppState::new(config));

    let listener = TcpListener::bind(&bind).await?;
    info!("mock del API de tareas escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
