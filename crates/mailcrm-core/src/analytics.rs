//! Delivery analytics and history export

use crate::campaigns::percentage;
use chrono::{DateTime, Utc};
use mailcrm_common::types::{CampaignId, ContactId, DeliveryId, OwnerId, TemplateId};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::{DeliveryRecord, TemplateStat};
use mailcrm_storage::Store;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const RECENT_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_sent: i64,
    pub total_opened: i64,
    pub total_clicked: i64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub template_stats: Vec<TemplateStat>,
    pub recent_emails: Vec<DeliveryRecord>,
}

/// Supported export serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::Validation(format!(
                "Unsupported export format: {} (expected csv or json)",
                other
            ))),
        }
    }
}

/// Serialized export ready to be returned as a download
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub content_type: &'static str,
    pub filename: String,
    pub body: Vec<u8>,
}

/// Flat export row; one per delivery record
#[derive(Debug, Serialize, Deserialize)]
struct ExportRow {
    id: DeliveryId,
    contact_id: ContactId,
    template_id: Option<TemplateId>,
    campaign_id: Option<CampaignId>,
    to_address: String,
    subject: String,
    status: String,
    scheduled_time: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    opened: bool,
    opened_at: Option<DateTime<Utc>>,
    open_count: i32,
    clicked: bool,
    clicked_at: Option<DateTime<Utc>>,
    click_count: i32,
    created_at: DateTime<Utc>,
}

impl From<&DeliveryRecord> for ExportRow {
    fn from(r: &DeliveryRecord) -> Self {
        Self {
            id: r.id,
            contact_id: r.contact_id,
            template_id: r.template_id,
            campaign_id: r.campaign_id,
            to_address: r.to_address.clone(),
            subject: r.subject.clone(),
            status: r.status.clone(),
            scheduled_time: r.scheduled_time,
            sent_at: r.sent_at,
            opened: r.opened,
            opened_at: r.opened_at,
            open_count: r.open_count,
            clicked: r.clicked,
            clicked_at: r.clicked_at,
            click_count: r.click_count,
            created_at: r.created_at,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct AnalyticsService {
    store: Store,
}

impl AnalyticsService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn summary(&self, owner_id: OwnerId) -> Result<AnalyticsSummary> {
        let stats = self.store.deliveries.stats_by_owner(owner_id).await?;
        let template_stats = self.store.deliveries.template_stats(owner_id).await?;
        let recent_emails = self
            .store
            .deliveries
            .list_by_owner(owner_id, Some(RECENT_LIMIT))
            .await?;

        Ok(AnalyticsSummary {
            total_sent: stats.total,
            total_opened: stats.opened,
            total_clicked: stats.clicked,
            open_rate: round2(percentage(stats.opened, stats.total)),
            click_rate: round2(percentage(stats.clicked, stats.total)),
            template_stats,
            recent_emails,
        })
    }

    /// Dump the owner's full delivery history
    pub async fn export(&self, owner_id: OwnerId, format: &str) -> Result<ExportFile> {
        let format: ExportFormat = format.parse()?;
        let records = self.store.deliveries.list_by_owner(owner_id, None).await?;
        let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
        let stamp = Utc::now().format("%Y%m%d%H%M%S");

        match format {
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                for row in &rows {
                    writer
                        .serialize(row)
                        .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))?;
                }
                let body = writer
                    .into_inner()
                    .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))?;
                Ok(ExportFile {
                    content_type: "text/csv",
                    filename: format!("email_analytics_{}.csv", stamp),
                    body,
                })
            }
            ExportFormat::Json => {
                let body = serde_json::to_vec_pretty(&rows)
                    .map_err(|e| Error::Internal(format!("JSON export failed: {}", e)))?;
                Ok(ExportFile {
                    content_type: "application/json",
                    filename: format!("email_analytics_{}.json", stamp),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::SendRequest;
    use crate::testing::Fixture;
    use mailcrm_common::types::EngagementKind;
    use pretty_assertions::assert_eq;

    async fn seeded() -> Fixture {
        let fx = Fixture::new().await;
        let template = fx.template("Hello {{name}}", "Body").await;
        for i in 0..3 {
            let c = fx
                .contact(&format!("C{i}"), &format!("c{i}@example.com"), None, None)
                .await;
            let record = fx
                .engine
                .send_to_contact(
                    fx.owner.id,
                    c.id,
                    SendRequest {
                        template_id: Some(template.id),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            if i == 0 {
                fx.store
                    .deliveries
                    .record_engagement(record.id, EngagementKind::Opened, Utc::now())
                    .await
                    .unwrap();
            }
        }
        fx
    }

    #[tokio::test]
    async fn test_summary_rates_are_rounded() {
        let fx = seeded().await;
        let summary = AnalyticsService::new(fx.store.clone())
            .summary(fx.owner.id)
            .await
            .unwrap();

        assert_eq!(summary.total_sent, 3);
        assert_eq!(summary.total_opened, 1);
        assert_eq!(summary.open_rate, 33.33);
        assert_eq!(summary.click_rate, 0.0);
        assert_eq!(summary.recent_emails.len(), 3);
        assert_eq!(summary.template_stats.len(), 1);
        assert_eq!(summary.template_stats[0].sent, 3);
    }

    #[tokio::test]
    async fn test_summary_is_read_only() {
        let fx = seeded().await;
        let service = AnalyticsService::new(fx.store.clone());
        let first = service.summary(fx.owner.id).await.unwrap();
        let second = service.summary(fx.owner.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.recent_emails[0], second.recent_emails[0]);
    }

    #[tokio::test]
    async fn test_export_csv_has_header_and_rows() {
        let fx = seeded().await;
        let file = AnalyticsService::new(fx.store.clone())
            .export(fx.owner.id, "CSV")
            .await
            .unwrap();

        assert_eq!(file.content_type, "text/csv");
        assert!(file.filename.ends_with(".csv"));
        let text = String::from_utf8(file.body).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("id,contact_id,template_id"));
        assert_eq!(lines.count(), 3);
    }

    #[tokio::test]
    async fn test_export_json_round_trips_rows() {
        let fx = seeded().await;
        let file = AnalyticsService::new(fx.store.clone())
            .export(fx.owner.id, "json")
            .await
            .unwrap();

        let rows: Vec<serde_json::Value> = serde_json::from_slice(&file.body).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r["opened"] == true).count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_format_is_validation_error() {
        let fx = Fixture::new().await;
        let err = AnalyticsService::new(fx.store.clone())
            .export(fx.owner.id, "xml")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }
}
