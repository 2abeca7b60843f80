//! Repository bundle shared by services

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use crate::repository::*;
use mailcrm_common::config::DatabaseConfig;
use mailcrm_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// One handle per repository, backed by either PostgreSQL or memory
#[derive(Clone)]
pub struct Store {
    pub owners: Arc<dyn OwnerRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub deliveries: Arc<dyn DeliveryRecordRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub drafts: Arc<dyn DraftRepository>,
    pool: Option<DatabasePool>,
}

impl Store {
    /// Connect to the configured backend, running migrations for PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match config.backend.as_str() {
            "postgres" => {
                let pool = DatabasePool::connect(config).await?;
                pool.migrate().await?;
                Ok(Self::postgres(pool))
            }
            "memory" => {
                info!("Using in-memory storage; data is lost on restart");
                Ok(Self::memory())
            }
            other => Err(Error::Config(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }

    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            owners: Arc::new(DbOwnerRepository::new(pool.clone())),
            api_keys: Arc::new(DbApiKeyRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            templates: Arc::new(DbTemplateRepository::new(pool.clone())),
            deliveries: Arc::new(DbDeliveryRecordRepository::new(pool.clone())),
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            activities: Arc::new(DbActivityRepository::new(pool.clone())),
            drafts: Arc::new(DbDraftRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn memory() -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            owners: memory.clone(),
            api_keys: memory.clone(),
            contacts: memory.clone(),
            templates: memory.clone(),
            deliveries: memory.clone(),
            campaigns: memory.clone(),
            activities: memory.clone(),
            drafts: memory,
            pool: None,
        }
    }

    /// Check backend health
    pub async fn health_check(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.health_check().await,
            None => Ok(()),
        }
    }
}
