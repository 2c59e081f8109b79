//! One-shot repair of every tenant's `bytes_used` counter from the
//! authoritative file records. Safe to run while the server is up.

use std::sync::Arc;

use forge_uploader::{
    config::Config,
    database::{Database, RecordStore},
    services::Reconciler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_uploader=info,reconcile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;
    let store: Arc<dyn RecordStore> = Arc::new(db);

    let corrections = Reconciler::new(store).run().await?;

    if corrections.is_empty() {
        tracing::info!("all usage counters consistent, nothing to repair");
    } else {
        tracing::info!(repaired = corrections.len(), "reconciliation finished");
    }

    Ok(())
}
