//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignContact, CampaignCounts, CreateCampaign};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcrm_common::types::{CampaignId, ContactId, EngagementKind, OwnerId};
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;

    async fn get_by_owner(&self, owner_id: OwnerId, id: CampaignId) -> Result<Option<Campaign>>;

    /// Ensure one campaign-contact row per pair; existing pairs are left alone.
    /// Returns the number of rows inserted.
    async fn add_contacts(&self, campaign_id: CampaignId, contact_ids: &[ContactId])
        -> Result<u64>;

    async fn list_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>>;

    /// Drop pairs for `contact_ids` that have not been sent; sent pairs stay
    async fn remove_unsent_contacts(
        &self,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64>;

    async fn mark_contact_sent(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Apply an engagement event to the pair; clicked URLs are kept distinct
    async fn record_contact_engagement(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        kind: EngagementKind,
        at: DateTime<Utc>,
        url: Option<&str>,
    ) -> Result<()>;

    async fn counts(&self, campaign_id: CampaignId) -> Result<CampaignCounts>;

    /// Flag the campaign as sent; returns false if it already was
    async fn mark_sent(&self, campaign_id: CampaignId, at: DateTime<Utc>) -> Result<bool>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let selection = serde_json::to_value(&input.selection)
            .map_err(|e| Error::Internal(format!("Failed to encode selection: {}", e)))?;

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, owner_id, name, description, from_name, from_address,
                subject, body, template_id, selection, scheduled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.from_name)
        .bind(&input.from_address)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.template_id)
        .bind(&selection)
        .bind(input.scheduled_at)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn add_contacts(
        &self,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        if contact_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO campaign_contacts (id, campaign_id, contact_id)
            SELECT gen_random_uuid(), $1, contact_id
            FROM unnest($2::uuid[]) AS contact_id
            ON CONFLICT (campaign_id, contact_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(contact_ids.to_vec())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>> {
        sqlx::query_as::<_, CampaignContact>(
            r#"
            SELECT * FROM campaign_contacts
            WHERE campaign_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn remove_unsent_contacts(
        &self,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        if contact_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM campaign_contacts
            WHERE campaign_id = $1 AND contact_id = ANY($2) AND NOT is_sent
            "#,
        )
        .bind(campaign_id)
        .bind(contact_ids.to_vec())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_contact_sent(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_contacts
            SET is_sent = TRUE, sent_at = COALESCE(sent_at, $3)
            WHERE campaign_id = $1 AND contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_contact_engagement(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        kind: EngagementKind,
        at: DateTime<Utc>,
        url: Option<&str>,
    ) -> Result<()> {
        let query = sqlx::query(match kind {
            EngagementKind::Opened => {
                r#"
                UPDATE campaign_contacts
                SET opened = TRUE,
                    opened_at = COALESCE(opened_at, $3),
                    opened_count = opened_count + 1
                WHERE campaign_id = $1 AND contact_id = $2
                "#
            }
            EngagementKind::Clicked => {
                r#"
                UPDATE campaign_contacts
                SET clicked = TRUE,
                    clicked_at = COALESCE(clicked_at, $3),
                    clicked_count = clicked_count + 1,
                    clicked_urls = CASE
                        WHEN $4::text IS NULL OR clicked_urls @> jsonb_build_array($4::text)
                            THEN clicked_urls
                        ELSE clicked_urls || jsonb_build_array($4::text)
                    END
                WHERE campaign_id = $1 AND contact_id = $2
                "#
            }
        })
        .bind(campaign_id)
        .bind(contact_id)
        .bind(at);

        let query = match kind {
            EngagementKind::Opened => query,
            EngagementKind::Clicked => query.bind(url),
        };

        query
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn counts(&self, campaign_id: CampaignId) -> Result<CampaignCounts> {
        sqlx::query_as::<_, CampaignCounts>(
            r#"
            SELECT COUNT(*) AS recipients,
                   COUNT(*) FILTER (WHERE is_sent) AS sent,
                   COUNT(*) FILTER (WHERE opened) AS opened,
                   COUNT(*) FILTER (WHERE clicked) AS clicked
            FROM campaign_contacts
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, campaign_id: CampaignId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET is_sent = TRUE, sent_at = $2, updated_at = $2
            WHERE id = $1 AND NOT is_sent
            "#,
        )
        .bind(campaign_id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
