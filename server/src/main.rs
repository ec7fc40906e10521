//! Stow Server binary.

use stow_server::config::Config;
use stow_server::mutators::default_registry;
use stow_server::store::Store;
use stow_server::{build_router, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stow_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Stow Server on {}:{}", config.host, config.port);

    let store = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.db_max_connections).await?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;

            Store::Postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not survive a restart");
            Store::memory()
        }
    };

    let mutators = default_registry()?;
    tracing::info!(mutators = ?mutators.names(), "Registered mutators");

    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(AppState::new(store, config, mutators));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
