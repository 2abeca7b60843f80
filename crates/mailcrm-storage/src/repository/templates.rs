//! Email template repository

use crate::db::DatabasePool;
use crate::models::{CreateTemplate, EmailTemplate};
use async_trait::async_trait;
use chrono::Utc;
use mailcrm_common::types::{OwnerId, TemplateId};
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// Email template repository trait
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create(&self, input: CreateTemplate) -> Result<EmailTemplate>;

    async fn get_by_owner(&self, owner_id: OwnerId, id: TemplateId)
        -> Result<Option<EmailTemplate>>;
}

/// Database email template repository
pub struct DbTemplateRepository {
    pool: DatabasePool,
}

impl DbTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for DbTemplateRepository {
    async fn create(&self, input: CreateTemplate) -> Result<EmailTemplate> {
        let now = Utc::now();
        sqlx::query_as::<_, EmailTemplate>(
            r#"
            INSERT INTO email_templates (id, owner_id, name, subject, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: TemplateId,
    ) -> Result<Option<EmailTemplate>> {
        sqlx::query_as::<_, EmailTemplate>(
            "SELECT * FROM email_templates WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
