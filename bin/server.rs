// SWIFT Code Registry - Web Server

use anyhow::{Context, Result};
use swift_registry::api::{router, AppState};
use swift_registry::{init_tracing, open_database, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::default();

    let conn = open_database(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        db = %config.db_path.display(),
        version = swift_registry::VERSION,
        "🚀 SWIFT code server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
