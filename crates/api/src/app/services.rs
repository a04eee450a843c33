use std::sync::Arc;

use tenantgate_infra::{Clock, GateConfig, Gatekeeper, InMemoryRelationStore, RelationStore, SystemClock};

/// Services shared by every handler; the store is chosen at startup.
pub type AppServices = Gatekeeper<dyn RelationStore>;

pub async fn build_services(config: &GateConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Ok(Gatekeeper::new(store, config, clock))
}

#[cfg(feature = "postgres")]
async fn build_store(config: &GateConfig) -> anyhow::Result<Arc<dyn RelationStore>> {
    use tenantgate_infra::PostgresRelationStore;

    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using in-memory relation store");
        return Ok(Arc::new(InMemoryRelationStore::new()));
    };

    let store = PostgresRelationStore::connect(url).await?;
    store.migrate().await?;
    tracing::info!("postgres relation store ready");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn build_store(config: &GateConfig) -> anyhow::Result<Arc<dyn RelationStore>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the `postgres` feature is disabled; using in-memory store");
    }
    Ok(Arc::new(InMemoryRelationStore::new()))
}
