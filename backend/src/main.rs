use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backend::config::AppConfig;
use backend::db::{establish_connection_pool, PgRoster, PgStore};
use backend::{create_app, AppState, CalendarActions, HomeStayFinder};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "backend=debug,homeday_backend=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenv::dotenv().ok();
    let config = AppConfig::from_env()?;

    tracing::info!("Starting homeday backend server");

    let pool = establish_connection_pool(&config.database_url, config.database_pool_size)?;
    tracing::info!("Database connection pool initialized");

    let store = Arc::new(PgStore::new(pool.clone()));
    let roster = Arc::new(PgRoster::new(pool));
    let home_stays = HomeStayFinder::new(store.clone(), store.clone(), roster.clone());
    let actions = CalendarActions::new(store.clone(), roster).with_config(config.workflow());
    tracing::info!(overlap_policy = ?config.overlap_policy, "Workflow configured");

    let app = create_app(AppState::new(actions, store, home_stays));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
