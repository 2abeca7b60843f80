//! Send draft repository

use crate::db::DatabasePool;
use crate::models::{CreateDraft, SendDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcrm_common::types::{DraftId, OwnerId};
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// Send draft repository trait
#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn create(&self, input: CreateDraft) -> Result<SendDraft>;

    async fn get_by_owner(&self, owner_id: OwnerId, id: DraftId) -> Result<Option<SendDraft>>;

    /// Delete a draft; returns false if it did not exist
    async fn delete(&self, owner_id: OwnerId, id: DraftId) -> Result<bool>;

    /// Delete every draft that expired at or before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Database send draft repository
pub struct DbDraftRepository {
    pool: DatabasePool,
}

impl DbDraftRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DraftRepository for DbDraftRepository {
    async fn create(&self, input: CreateDraft) -> Result<SendDraft> {
        sqlx::query_as::<_, SendDraft>(
            r#"
            INSERT INTO send_drafts (
                id, owner_id, contact_ids, template_id, subject, body,
                scheduled_time, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.contact_ids)
        .bind(input.template_id)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.scheduled_time)
        .bind(input.expires_at)
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: DraftId) -> Result<Option<SendDraft>> {
        sqlx::query_as::<_, SendDraft>(
            "SELECT * FROM send_drafts WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn delete(&self, owner_id: OwnerId, id: DraftId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM send_drafts WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM send_drafts WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
