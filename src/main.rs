use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use forge_uploader::{
    config::Config,
    create_app,
    database::{Database, RecordStore},
    handlers::AppState,
    models::DEFAULT_PLAN,
    storage::local::LocalStorage,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_uploader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;
    let store: Arc<dyn RecordStore> = Arc::new(db);

    if store.find_plan_by_name(DEFAULT_PLAN).await?.is_none() {
        store
            .create_plan(DEFAULT_PLAN, config.free_plan_bytes)
            .await?;
        tracing::info!(
            plan = DEFAULT_PLAN,
            byte_ceiling = config.free_plan_bytes,
            "seeded default plan"
        );
    }

    let files = Arc::new(LocalStorage::new(&config.upload_dir)?);
    let state = AppState::new(config.clone(), store, files);

    // Idle limiter buckets are swept hourly; the key map is unbounded
    // otherwise.
    let limiter = state.rate_limiter.clone();
    let idle_ttl = Duration::from_secs(config.rate_limit_idle_ttl_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let evicted = limiter.sweep_idle(idle_ttl);
            if evicted > 0 {
                tracing::debug!(evicted, "swept idle rate limiter buckets");
            }
        }
    });

    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "forge-uploader listening");
    // ConnectInfo gives the limiter a per-origin key for direct connections.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
