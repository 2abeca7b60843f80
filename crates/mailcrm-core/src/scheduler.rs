//! Due-email poller
//!
//! A pass claims every due `pending` record with a conditional update before
//! handing it to the dispatch engine, so overlapping passes (or several
//! worker processes) never submit the same record twice. Content was frozen
//! when the record was scheduled and is sent as-is.

use crate::campaigns::CampaignFanout;
use crate::dispatch::{DispatchEngine, DispatchPath};
use chrono::{DateTime, Duration, Utc};
use mailcrm_common::config::SchedulerConfig;
use mailcrm_common::types::{CampaignId, DeliveryId};
use mailcrm_common::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counts for one poller pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuePassSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Due records another poller claimed first
    pub skipped: usize,
    pub campaigns_completed: usize,
    pub drafts_purged: u64,
}

/// Periodic dispatcher for scheduled sends
pub struct DuePoller {
    engine: Arc<DispatchEngine>,
    fanout: Arc<CampaignFanout>,
    batch_size: i64,
    claim_lease: Duration,
}

impl DuePoller {
    pub fn new(
        engine: Arc<DispatchEngine>,
        fanout: Arc<CampaignFanout>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            fanout,
            batch_size: config.batch_size.max(1),
            claim_lease: Duration::seconds(config.claim_lease_secs.max(1)),
        }
    }

    /// Dispatch every record due at `now`
    pub async fn run_due_pass(&self, now: DateTime<Utc>) -> Result<DuePassSummary> {
        let store = self.engine.store();
        let lease_cutoff = now - self.claim_lease;
        let mut summary = DuePassSummary::default();
        let mut seen: HashSet<DeliveryId> = HashSet::new();
        let mut campaigns: HashSet<CampaignId> = HashSet::new();

        loop {
            let due = store
                .deliveries
                .list_due(now, lease_cutoff, self.batch_size)
                .await?;
            let fresh: Vec<_> = due.into_iter().filter(|r| seen.insert(r.id)).collect();
            if fresh.is_empty() {
                break;
            }

            for record in fresh {
                let tracking_id = Uuid::new_v4().to_string();
                let claimed = store
                    .deliveries
                    .claim(record.id, now, lease_cutoff, &tracking_id)
                    .await?;
                let Some(claimed) = claimed else {
                    debug!(delivery_id = %record.id, "Record claimed elsewhere, skipping");
                    summary.skipped += 1;
                    continue;
                };

                summary.attempted += 1;
                if let Some(campaign_id) = claimed.campaign_id {
                    campaigns.insert(campaign_id);
                }

                match self.engine.deliver(&claimed, DispatchPath::Scheduled).await {
                    Ok(_) => summary.sent += 1,
                    Err(e) => {
                        warn!(delivery_id = %claimed.id, error = %e, "Scheduled email failed");
                        summary.failed += 1;
                    }
                }
            }
        }

        for campaign_id in campaigns {
            match self.fanout.reconcile(campaign_id, now).await {
                Ok(true) => summary.campaigns_completed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(campaign_id = %campaign_id, error = %e, "Failed to reconcile campaign")
                }
            }
        }

        summary.drafts_purged = store.drafts.delete_expired(now).await?;

        info!(
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            campaigns_completed = summary.campaigns_completed,
            drafts_purged = summary.drafts_purged,
            "Due pass finished"
        );
        Ok(summary)
    }

    /// Run passes forever at `interval`
    pub async fn run(self: Arc<Self>, interval: std::time::Duration) {
        info!(interval_secs = interval.as_secs(), "Starting due-email poller");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_due_pass(Utc::now()).await {
                error!(error = %e, "Due pass failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::BulkSendRequest;
    use crate::testing::Fixture;
    use mailcrm_common::types::DeliveryStatus;
    use mailcrm_storage::models::{CreateCampaign, CreateDeliveryRecord, CreateDraft};
    use pretty_assertions::assert_eq;

    fn poller(fx: &Fixture) -> DuePoller {
        let fanout = Arc::new(CampaignFanout::new(fx.engine.clone()));
        DuePoller::new(fx.engine.clone(), fanout, &SchedulerConfig::default())
    }

    async fn schedule(fx: &Fixture, count: usize, at: DateTime<Utc>) {
        let template = fx.template("Hi {{name}}", "Sent on {{day}}").await;
        let mut ids = Vec::new();
        for i in 0..count {
            let c = fx
                .contact(&format!("C{i}"), &format!("c{i}@example.com"), None, None)
                .await;
            ids.push(c.id);
        }
        let report = fx
            .engine
            .send_bulk(
                fx.owner.id,
                BulkSendRequest {
                    contact_ids: ids,
                    template_id: Some(template.id),
                    scheduled_time: Some(at),
                },
            )
            .await
            .unwrap();
        assert_eq!(report.scheduled_count, count);
    }

    #[tokio::test]
    async fn test_pass_sends_due_records_once() {
        let fx = Fixture::new().await;
        let at = Utc::now() + Duration::minutes(30);
        schedule(&fx, 3, at).await;
        let poller = poller(&fx);

        let early = poller.run_due_pass(Utc::now()).await.unwrap();
        assert_eq!(early.attempted, 0);

        let later = at + Duration::minutes(1);
        let first = poller.run_due_pass(later).await.unwrap();
        assert_eq!(first.attempted, 3);
        assert_eq!(first.sent, 3);

        let second = poller.run_due_pass(later).await.unwrap();
        assert_eq!(second, DuePassSummary::default());
        assert_eq!(fx.gateway.sent().len(), 3);

        for record in fx.store.deliveries.list_by_owner(fx.owner.id, None).await.unwrap() {
            assert_eq!(record.status_enum(), Some(DeliveryStatus::Sent));
            assert!(record.tracking_id.is_some());
            assert!(record.subject.starts_with("Hi C"));
        }

        let kinds: Vec<String> = fx
            .store
            .activities
            .list_by_owner(fx.owner.id, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds.iter().filter(|k| *k == "scheduled_email_sent").count(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let fx = Fixture::new().await;
        let at = Utc::now() + Duration::minutes(5);
        schedule(&fx, 3, at).await;
        fx.gateway.fail_for("c0@example.com");

        let summary = poller(&fx).run_due_pass(at).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);

        // Failed records are terminal and never picked up again
        let again = poller(&fx).run_due_pass(at).await.unwrap();
        assert_eq!(again.attempted, 0);
    }

    #[tokio::test]
    async fn test_record_claimed_elsewhere_is_skipped() {
        let fx = Fixture::new().await;
        let contact = fx.contact("A", "a@example.com", None, None).await;
        let now = Utc::now();
        let record = fx
            .store
            .deliveries
            .create(CreateDeliveryRecord {
                owner_id: fx.owner.id,
                contact_id: contact.id,
                template_id: None,
                campaign_id: None,
                from_address: "noreply@localhost".to_string(),
                to_address: contact.email.clone(),
                subject: "S".to_string(),
                body: "B".to_string(),
                scheduled_time: Some(now - Duration::minutes(1)),
                tracking_id: None,
                claimed_at: None,
            })
            .await
            .unwrap();

        // Another worker holds a fresh claim
        fx.store
            .deliveries
            .claim(record.id, now, now - Duration::minutes(15), "other-worker")
            .await
            .unwrap()
            .unwrap();

        let summary = poller(&fx).run_due_pass(now).await.unwrap();
        assert_eq!(summary.attempted, 0);
        assert!(fx.gateway.sent().is_empty());

        // Once the lease has lapsed the record is taken over
        let later = now + Duration::minutes(16);
        let summary = poller(&fx).run_due_pass(later).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(fx.gateway.sent()[0].tracking_id, "other-worker");
    }

    #[tokio::test]
    async fn test_pass_completes_scheduled_campaign_and_purges_drafts() {
        let fx = Fixture::new().await;
        let a = fx.contact("A", "a@example.com", Some("Acme"), None).await;
        let at = Utc::now() + Duration::minutes(10);
        let campaign = fx
            .store
            .campaigns
            .create(CreateCampaign {
                owner_id: fx.owner.id,
                name: "Scheduled".to_string(),
                description: None,
                from_name: None,
                from_address: None,
                subject: "S".to_string(),
                body: "B".to_string(),
                template_id: None,
                selection: mailcrm_common::types::RecipientSelection::Filter {
                    companies: vec!["Acme".to_string()],
                    positions: vec![],
                },
                scheduled_at: Some(at),
            })
            .await
            .unwrap();
        let fanout = Arc::new(CampaignFanout::new(fx.engine.clone()));
        fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();

        fx.store
            .drafts
            .create(CreateDraft {
                owner_id: fx.owner.id,
                contact_ids: vec![a.id],
                template_id: None,
                subject: "S".to_string(),
                body: "B".to_string(),
                scheduled_time: None,
                expires_at: at - Duration::minutes(1),
            })
            .await
            .unwrap();

        let poller = DuePoller::new(fx.engine.clone(), fanout, &SchedulerConfig::default());
        let summary = poller.run_due_pass(at).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.campaigns_completed, 1);
        assert_eq!(summary.drafts_purged, 1);
        assert!(fx.store.campaigns.get(campaign.id).await.unwrap().unwrap().is_sent);
    }
}
