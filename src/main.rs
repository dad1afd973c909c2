use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use recommender_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, run_migrations, PgEventStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recommender_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(
        &config.database_url,
        config.db_max_connections,
        config.query_timeout(),
    )
    .await?;

    if config.run_migrations {
        run_migrations(&pool).await?;
    }

    let store = Arc::new(PgEventStore::new(pool, config.query_timeout()));
    let app = create_router(AppState::new(store, &config));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
