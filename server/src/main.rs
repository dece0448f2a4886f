//! Curator Server binary.

use curator_server::config::Config;
use curator_server::{build_router, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Curator Server on {}:{}", config.host, config.port);
    tracing::info!(
        "Backups in {}, state in {}",
        config.backup_dir.display(),
        config.state_dir.display()
    );

    let driver = db::connect(&config.database_url).await?;

    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(AppState::new(driver, config));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
