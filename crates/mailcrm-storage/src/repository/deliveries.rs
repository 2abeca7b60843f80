//! Delivery record repository
//!
//! All status writes go through the same forward-only rule as
//! [`DeliveryStatus::advance`], expressed in SQL so that concurrent writers
//! (the synchronous send path, the due poller and provider webhooks) cannot
//! move a record backwards.

use crate::db::DatabasePool;
use crate::models::{CreateDeliveryRecord, DeliveryRecord, DeliveryStats, TemplateStat};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcrm_common::types::{CampaignId, DeliveryId, DeliveryStatus, EngagementKind, OwnerId};
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// `$2` is the incoming status
const ADVANCE_STATUS: &str = r#"
    CASE
        WHEN $2 = 'failed' THEN 'failed'
        WHEN status = 'pending' THEN $2
        ELSE status
    END
"#;

/// Delivery record repository trait
#[async_trait]
pub trait DeliveryRecordRepository: Send + Sync {
    /// Persist a new `pending` record
    async fn create(&self, input: CreateDeliveryRecord) -> Result<DeliveryRecord>;

    async fn get(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>>;

    async fn get_by_owner(&self, owner_id: OwnerId, id: DeliveryId)
        -> Result<Option<DeliveryRecord>>;

    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<DeliveryRecord>>;

    async fn find_by_provider_message_id(&self, message_id: &str)
        -> Result<Option<DeliveryRecord>>;

    /// Pending records due at `now` whose claim is absent or older than `lease_cutoff`
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryRecord>>;

    /// Atomically claim a pending record for dispatch, assigning `tracking_id`
    /// when the record has none. Returns `None` if another worker holds it or
    /// it is no longer pending.
    async fn claim(
        &self,
        id: DeliveryId,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        tracking_id: &str,
    ) -> Result<Option<DeliveryRecord>>;

    /// Record a successful provider submission
    async fn mark_sent(
        &self,
        id: DeliveryId,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>>;

    /// Record a failed provider submission
    async fn mark_failed(
        &self,
        id: DeliveryId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>>;

    /// Apply a provider-reported status
    async fn apply_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>>;

    /// Set the engagement flag, first-seen timestamp and bump the counter
    async fn record_engagement(
        &self,
        id: DeliveryId,
        kind: EngagementKind,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>>;

    /// Owner records, newest first
    async fn list_by_owner(&self, owner_id: OwnerId, limit: Option<i64>)
        -> Result<Vec<DeliveryRecord>>;

    /// Campaign records still waiting to be sent
    async fn list_pending_by_campaign(&self, campaign_id: CampaignId)
        -> Result<Vec<DeliveryRecord>>;

    async fn stats_by_owner(&self, owner_id: OwnerId) -> Result<DeliveryStats>;

    async fn template_stats(&self, owner_id: OwnerId) -> Result<Vec<TemplateStat>>;
}

/// Database delivery record repository
pub struct DbDeliveryRecordRepository {
    pool: DatabasePool,
}

impl DbDeliveryRecordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn advance(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        detail: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let query = format!(
            r#"
            UPDATE delivery_records
            SET status = {ADVANCE_STATUS},
                status_detail = COALESCE($3, status_detail),
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#
        );
        sqlx::query_as::<_, DeliveryRecord>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(detail)
            .bind(at)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl DeliveryRecordRepository for DbDeliveryRecordRepository {
    async fn create(&self, input: CreateDeliveryRecord) -> Result<DeliveryRecord> {
        let now = Utc::now();
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            INSERT INTO delivery_records (
                id, owner_id, contact_id, template_id, campaign_id,
                from_address, to_address, subject, body, scheduled_time,
                status, tracking_id, claimed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(input.contact_id)
        .bind(input.template_id)
        .bind(input.campaign_id)
        .bind(&input.from_address)
        .bind(&input.to_address)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.scheduled_time)
        .bind(&input.tracking_id)
        .bind(input.claimed_at)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>("SELECT * FROM delivery_records WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: DeliveryId,
    ) -> Result<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            "SELECT * FROM delivery_records WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            "SELECT * FROM delivery_records WHERE tracking_id = $1",
        )
        .bind(tracking_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_provider_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT * FROM delivery_records
            WHERE provider_message_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT * FROM delivery_records
            WHERE status = 'pending'
              AND scheduled_time IS NOT NULL
              AND scheduled_time <= $1
              AND (claimed_at IS NULL OR claimed_at < $2)
            ORDER BY scheduled_time ASC, created_at ASC
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(lease_cutoff)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim(
        &self,
        id: DeliveryId,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        tracking_id: &str,
    ) -> Result<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            UPDATE delivery_records
            SET claimed_at = $2,
                tracking_id = COALESCE(tracking_id, $4),
                updated_at = $2
            WHERE id = $1
              AND status = 'pending'
              AND (claimed_at IS NULL OR claimed_at < $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(lease_cutoff)
        .bind(tracking_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(
        &self,
        id: DeliveryId,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let query = format!(
            r#"
            UPDATE delivery_records
            SET status = {ADVANCE_STATUS},
                provider_message_id = $3,
                sent_at = $4,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#
        );
        sqlx::query_as::<_, DeliveryRecord>(&query)
            .bind(id)
            .bind(DeliveryStatus::Sent.as_str())
            .bind(provider_message_id)
            .bind(at)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_failed(
        &self,
        id: DeliveryId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        self.advance(id, DeliveryStatus::Failed, Some(reason), at)
            .await
    }

    async fn apply_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        self.advance(id, status, None, at).await
    }

    async fn record_engagement(
        &self,
        id: DeliveryId,
        kind: EngagementKind,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let query = match kind {
            EngagementKind::Opened => {
                r#"
                UPDATE delivery_records
                SET opened = TRUE,
                    opened_at = COALESCE(opened_at, $2),
                    open_count = open_count + 1,
                    updated_at = $2
                WHERE id = $1
                RETURNING *
                "#
            }
            EngagementKind::Clicked => {
                r#"
                UPDATE delivery_records
                SET clicked = TRUE,
                    clicked_at = COALESCE(clicked_at, $2),
                    click_count = click_count + 1,
                    updated_at = $2
                WHERE id = $1
                RETURNING *
                "#
            }
        };

        sqlx::query_as::<_, DeliveryRecord>(query)
            .bind(id)
            .bind(at)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        limit: Option<i64>,
    ) -> Result<Vec<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT * FROM delivery_records
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

    async fn list_pending_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT * FROM delivery_records
            WHERE campaign_id = $1 AND status = 'pending'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn stats_by_owner(&self, owner_id: OwnerId) -> Result<DeliveryStats> {
        sqlx::query_as::<_, DeliveryStats>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE opened) AS opened,
                   COUNT(*) FILTER (WHERE clicked) AS clicked
            FROM delivery_records
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn template_stats(&self, owner_id: OwnerId) -> Result<Vec<TemplateStat>> {
        sqlx::query_as::<_, TemplateStat>(
            r#"
            SELECT d.template_id,
                   t.name AS template_name,
                   COUNT(*) AS sent,
                   COUNT(*) FILTER (WHERE d.opened) AS opened,
                   COUNT(*) FILTER (WHERE d.clicked) AS clicked
            FROM delivery_records d
            LEFT JOIN email_templates t ON t.id = d.template_id
            WHERE d.owner_id = $1
            GROUP BY d.template_id, t.name
            ORDER BY sent DESC, t.name ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
