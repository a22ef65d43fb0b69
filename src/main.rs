use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crewserver::api_router::configure_api_routes;
use crewserver::notify::{HoursPerformance, LogNotifier};
use crewserver::shared::cache::StatusCache;
use crewserver::shared::config::AppConfig;
use crewserver::shared::state::AppState;
use crewserver::shared::utils::create_conn;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::load()?;
    let pool = create_conn()?;

    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        statuses: Arc::new(StatusCache::new()),
        performance: Arc::new(HoursPerformance),
        notifier: Arc::new(LogNotifier),
    });

    let app = configure_api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("crewserver listening on {}", config.server.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
