//! Activity (audit trail) repository

use crate::db::DatabasePool;
use crate::models::{Activity, CreateActivity};
use async_trait::async_trait;
use chrono::Utc;
use mailcrm_common::types::OwnerId;
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// Activity repository trait
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn record(&self, input: CreateActivity) -> Result<Activity>;

    /// Owner activities, newest first
    async fn list_by_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Activity>>;
}

/// Database activity repository
pub struct DbActivityRepository {
    pool: DatabasePool,
}

impl DbActivityRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for DbActivityRepository {
    async fn record(&self, input: CreateActivity) -> Result<Activity> {
        let details = serde_json::to_value(&input.kind)
            .map_err(|e| Error::Internal(format!("Failed to encode activity: {}", e)))?;

        sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (id, owner_id, kind, details, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(input.kind.name())
        .bind(&details)
        .bind(&input.description)
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Activity>> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT * FROM activities
            WHERE owner_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
