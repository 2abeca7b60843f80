//! Campaign Fan-out Controller
//!
//! Expands a campaign's recipient selection, records one campaign-contact
//! row per recipient and dispatches through the engine. The campaign only
//! flips to sent once every selected recipient has a successful send.

use crate::dispatch::{DispatchEngine, MessageContent, RecipientError};
use chrono::{DateTime, Utc};
use mailcrm_common::types::{ActivityKind, CampaignId, OwnerId, RecipientSelection};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::{Campaign, Contact};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Outcome of one campaign fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSendReport {
    pub campaign_id: CampaignId,
    pub recipients: usize,
    /// Recipients already sent by an earlier run
    pub skipped: usize,
    /// Recipients with a scheduled record that the poller has not sent yet
    pub awaiting: usize,
    pub sent_count: usize,
    pub scheduled_count: usize,
    pub errors: Vec<RecipientError>,
    /// Whether the campaign is now marked sent
    pub completed: bool,
}

impl CampaignSendReport {
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            format!(
                "Campaign sent to {} of {} recipients",
                self.sent_count + self.skipped,
                self.recipients
            )
        } else {
            format!(
                "Campaign partially sent: {} sent, {} failed",
                self.sent_count,
                self.errors.len()
            )
        }
    }
}

/// Aggregate engagement for a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: CampaignId,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipients: i64,
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub open_rate: f64,
    pub click_rate: f64,
}

/// Campaign fan-out controller
pub struct CampaignFanout {
    engine: Arc<DispatchEngine>,
}

impl CampaignFanout {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    async fn get_campaign(&self, owner_id: OwnerId, campaign_id: CampaignId) -> Result<Campaign> {
        self.engine
            .store()
            .campaigns
            .get_by_owner(owner_id, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))
    }

    /// Resolve the campaign's recipients as of now
    pub async fn expand(&self, campaign: &Campaign) -> Result<Vec<Contact>> {
        let contacts = &self.engine.store().contacts;
        match campaign.selection()? {
            RecipientSelection::List { list_id } => {
                contacts.list_members(campaign.owner_id, list_id).await
            }
            RecipientSelection::Filter {
                companies,
                positions,
            } => {
                contacts
                    .list_by_filter(campaign.owner_id, &companies, &positions)
                    .await
            }
        }
    }

    async fn content(&self, campaign: &Campaign) -> Result<MessageContent> {
        let mut content = match campaign.template_id {
            Some(template_id) => self
                .engine
                .resolve_content(campaign.owner_id, Some(template_id), None, None)
                .await?,
            None => self
                .engine
                .resolve_content(
                    campaign.owner_id,
                    None,
                    Some(campaign.subject.clone()),
                    Some(campaign.body.clone()),
                )
                .await?,
        };
        content.from = campaign.sender();
        Ok(content)
    }

    /// Fan a campaign out to its recipients
    pub async fn send_campaign(
        &self,
        owner_id: OwnerId,
        campaign_id: CampaignId,
    ) -> Result<CampaignSendReport> {
        let campaign = self.get_campaign(owner_id, campaign_id).await?;
        if campaign.is_sent {
            return Err(Error::Conflict(format!(
                "Campaign {} has already been sent",
                campaign_id
            )));
        }

        let content = self.content(&campaign).await?;
        let recipients = self.expand(&campaign).await?;
        let store = self.engine.store();

        let ids: Vec<_> = recipients.iter().map(|c| c.id).collect();
        store.campaigns.add_contacts(campaign_id, &ids).await?;

        let awaiting: HashSet<_> = store
            .deliveries
            .list_pending_by_campaign(campaign_id)
            .await?
            .into_iter()
            .map(|record| record.contact_id)
            .collect();

        // Unsent pairs for contacts that left the selection no longer count
        let selected: HashSet<_> = ids.iter().copied().collect();
        let mut already_sent = HashSet::new();
        let mut stale = Vec::new();
        for cc in store.campaigns.list_contacts(campaign_id).await? {
            if cc.is_sent {
                already_sent.insert(cc.contact_id);
            } else if !selected.contains(&cc.contact_id) && !awaiting.contains(&cc.contact_id) {
                stale.push(cc.contact_id);
            }
        }
        if !stale.is_empty() {
            let removed = store
                .campaigns
                .remove_unsent_contacts(campaign_id, &stale)
                .await?;
            info!(campaign_id = %campaign_id, removed, "Dropped recipients no longer selected");
        }

        let pending: Vec<Contact> = recipients
            .iter()
            .filter(|c| !already_sent.contains(&c.id) && !awaiting.contains(&c.id))
            .cloned()
            .collect();
        let waiting = recipients
            .iter()
            .filter(|c| !already_sent.contains(&c.id) && awaiting.contains(&c.id))
            .count();

        info!(
            campaign_id = %campaign_id,
            recipients = recipients.len(),
            pending = pending.len(),
            awaiting = waiting,
            "Fanning out campaign"
        );

        let bulk = self
            .engine
            .dispatch_to(
                owner_id,
                &pending,
                &content,
                campaign.scheduled_at,
                Some(campaign_id),
            )
            .await?;

        let completed = self.reconcile(campaign_id, Utc::now()).await?;

        Ok(CampaignSendReport {
            campaign_id,
            recipients: recipients.len(),
            skipped: recipients.len() - pending.len() - waiting,
            awaiting: waiting,
            sent_count: bulk.sent_count,
            scheduled_count: bulk.scheduled_count,
            errors: bulk.errors,
            completed,
        })
    }

    /// Mark the campaign sent if every selected recipient has been sent.
    /// Returns whether the campaign is sent after the call.
    pub async fn reconcile(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<bool> {
        let store = self.engine.store();
        let Some(campaign) = store.campaigns.get(campaign_id).await? else {
            return Ok(false);
        };
        if campaign.is_sent {
            return Ok(true);
        }

        let counts = store.campaigns.counts(campaign_id).await?;
        if counts.recipients == 0 || counts.sent < counts.recipients {
            return Ok(false);
        }

        if store.campaigns.mark_sent(campaign_id, now).await? {
            info!(campaign_id = %campaign_id, recipients = counts.recipients, "Campaign sent");
            self.engine
                .record_activity(
                    campaign.owner_id,
                    ActivityKind::CampaignSent { campaign_id },
                    format!(
                        "Campaign {} sent to {} recipients",
                        campaign.name, counts.recipients
                    ),
                )
                .await;
        }
        Ok(true)
    }

    /// Engagement rates for a campaign
    pub async fn stats(&self, owner_id: OwnerId, campaign_id: CampaignId) -> Result<CampaignStats> {
        let campaign = self.get_campaign(owner_id, campaign_id).await?;
        let counts = self.engine.store().campaigns.counts(campaign_id).await?;

        Ok(CampaignStats {
            campaign_id,
            is_sent: campaign.is_sent,
            sent_at: campaign.sent_at,
            recipients: counts.recipients,
            sent: counts.sent,
            opened: counts.opened,
            clicked: counts.clicked,
            open_rate: percentage(counts.opened, counts.recipients),
            click_rate: percentage(counts.clicked, counts.opened),
        })
    }
}

/// `part / whole * 100`, zero when `whole` is zero
pub(crate) fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::Duration;
    use mailcrm_common::types::EngagementKind;
    use mailcrm_storage::models::CreateCampaign;
    use pretty_assertions::assert_eq;

    async fn campaign(fx: &Fixture, selection: RecipientSelection) -> Campaign {
        fx.store
            .campaigns
            .create(CreateCampaign {
                owner_id: fx.owner.id,
                name: "Spring".to_string(),
                description: None,
                from_name: Some("Acme Marketing".to_string()),
                from_address: Some("marketing@acme.test".to_string()),
                subject: "Hello {{name}}".to_string(),
                body: "News for {{company}}".to_string(),
                template_id: None,
                selection,
                scheduled_at: None,
            })
            .await
            .unwrap()
    }

    async fn three_in_a_list(fx: &Fixture) -> RecipientSelection {
        let list = fx.store.contacts.create_list(fx.owner.id, "VIP").await.unwrap();
        let mut ids = Vec::new();
        for i in 0..3 {
            let c = fx
                .contact(&format!("C{i}"), &format!("c{i}@example.com"), Some("Acme"), None)
                .await;
            ids.push(c.id);
        }
        fx.store.contacts.add_list_members(list.id, &ids).await.unwrap();
        RecipientSelection::List { list_id: list.id }
    }

    #[tokio::test]
    async fn test_all_success_marks_campaign_sent() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let campaign = campaign(&fx, selection).await;
        let fanout = CampaignFanout::new(fx.engine.clone());

        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.sent_count, 3);
        assert!(report.errors.is_empty());
        assert!(report.completed);

        let stored = fx.store.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert!(stored.is_sent);
        assert!(stored.sent_at.is_some());

        let sent = fx.gateway.sent();
        assert_eq!(sent[0].from, "Acme Marketing <marketing@acme.test>");
        assert_eq!(sent[0].subject, "Hello C0");
        assert_eq!(sent[0].body, "News for Acme");
    }

    #[tokio::test]
    async fn test_one_failure_keeps_campaign_unsent_and_rerun_retries_only_failed() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let campaign = campaign(&fx, selection).await;
        let fanout = CampaignFanout::new(fx.engine.clone());
        fx.gateway.fail_for("c1@example.com");

        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.sent_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.completed);
        assert_eq!(report.message(), "Campaign partially sent: 2 sent, 1 failed");
        assert!(!fx.store.campaigns.get(campaign.id).await.unwrap().unwrap().is_sent);

        let counts = fx.store.campaigns.counts(campaign.id).await.unwrap();
        assert_eq!(counts.recipients, 3);
        assert_eq!(counts.sent, 2);

        // The failing mailbox recovers before the second run
        let gateway_calls_before = fx.gateway.sent().len();
        fx.gateway.clear_failures();

        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.sent_count, 1);
        assert!(report.completed);
        assert_eq!(fx.gateway.sent().len(), gateway_calls_before + 1);
    }

    #[tokio::test]
    async fn test_sent_campaign_is_conflict() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let campaign = campaign(&fx, selection).await;
        let fanout = CampaignFanout::new(fx.engine.clone());

        fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        let err = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(fx.gateway.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_filter_selection_intersects_and_empty_is_unconstrained() {
        let fx = Fixture::new().await;
        fx.contact("A", "a@example.com", Some("Acme"), Some("CTO")).await;
        fx.contact("B", "b@example.com", Some("Acme"), Some("Intern")).await;
        fx.contact("C", "c@example.com", Some("Globex"), Some("CTO")).await;
        let fanout = CampaignFanout::new(fx.engine.clone());

        let both = campaign(
            &fx,
            RecipientSelection::Filter {
                companies: vec!["Acme".to_string()],
                positions: vec!["CTO".to_string()],
            },
        )
        .await;
        let names: Vec<_> = fanout
            .expand(&both)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["A".to_string()]);

        let everyone = campaign(
            &fx,
            RecipientSelection::Filter {
                companies: vec![],
                positions: vec![],
            },
        )
        .await;
        assert_eq!(fanout.expand(&everyone).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_membership_is_read_at_dispatch() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let campaign = campaign(&fx, selection.clone()).await;
        let RecipientSelection::List { list_id } = selection else {
            unreachable!()
        };
        let late = fx.contact("Late", "late@example.com", None, None).await;
        fx.store
            .contacts
            .add_list_members(list_id, &[late.id])
            .await
            .unwrap();

        let fanout = CampaignFanout::new(fx.engine.clone());
        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.recipients, 4);
        assert_eq!(report.sent_count, 4);
    }

    #[tokio::test]
    async fn test_scheduled_campaign_defers_to_poller() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let mut input = CreateCampaign {
            owner_id: fx.owner.id,
            name: "Later".to_string(),
            description: None,
            from_name: None,
            from_address: None,
            subject: "S".to_string(),
            body: "B".to_string(),
            template_id: None,
            selection,
            scheduled_at: None,
        };
        input.scheduled_at = Some(Utc::now() + Duration::hours(1));
        let campaign = fx.store.campaigns.create(input).await.unwrap();

        let fanout = CampaignFanout::new(fx.engine.clone());
        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.scheduled_count, 3);
        assert!(!report.completed);
        assert!(fx.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_of_scheduled_campaign_does_not_duplicate_records() {
        use crate::scheduler::DuePoller;
        use mailcrm_common::config::SchedulerConfig;

        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let at = Utc::now() + Duration::hours(1);
        let campaign = fx
            .store
            .campaigns
            .create(CreateCampaign {
                owner_id: fx.owner.id,
                name: "Later".to_string(),
                description: None,
                from_name: None,
                from_address: None,
                subject: "S".to_string(),
                body: "B".to_string(),
                template_id: None,
                selection,
                scheduled_at: Some(at),
            })
            .await
            .unwrap();
        let fanout = Arc::new(CampaignFanout::new(fx.engine.clone()));

        let first = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(first.scheduled_count, 3);

        let second = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(second.scheduled_count, 0);
        assert_eq!(second.awaiting, 3);
        assert_eq!(second.skipped, 0);
        assert_eq!(
            fx.store
                .deliveries
                .list_pending_by_campaign(campaign.id)
                .await
                .unwrap()
                .len(),
            3
        );

        let poller = DuePoller::new(fx.engine.clone(), fanout.clone(), &SchedulerConfig::default());
        let summary = poller.run_due_pass(at + Duration::minutes(1)).await.unwrap();
        assert_eq!(summary.sent, 3);
        assert_eq!(fx.gateway.sent().len(), 3);
        assert!(fx.store.campaigns.get(campaign.id).await.unwrap().unwrap().is_sent);
    }

    #[tokio::test]
    async fn test_recipient_removed_after_failure_does_not_block_completion() {
        let fx = Fixture::new().await;
        let list = fx.store.contacts.create_list(fx.owner.id, "Pilot").await.unwrap();
        let a = fx.contact("A", "a@example.com", None, None).await;
        let b = fx.contact("B", "b@example.com", None, None).await;
        fx.store
            .contacts
            .add_list_members(list.id, &[a.id, b.id])
            .await
            .unwrap();
        let campaign = campaign(&fx, RecipientSelection::List { list_id: list.id }).await;
        let fanout = CampaignFanout::new(fx.engine.clone());
        fx.gateway.fail_for("b@example.com");

        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert!(!report.completed);

        fx.store
            .contacts
            .remove_list_members(list.id, &[b.id])
            .await
            .unwrap();
        let report = fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(report.recipients, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.sent_count, 0);
        assert!(report.completed);

        let counts = fx.store.campaigns.counts(campaign.id).await.unwrap();
        assert_eq!(counts.recipients, 1);
        assert!(fx.store.campaigns.get(campaign.id).await.unwrap().unwrap().is_sent);
    }

    #[tokio::test]
    async fn test_stats_rates() {
        let fx = Fixture::new().await;
        let selection = three_in_a_list(&fx).await;
        let campaign = campaign(&fx, selection).await;
        let fanout = CampaignFanout::new(fx.engine.clone());
        fanout.send_campaign(fx.owner.id, campaign.id).await.unwrap();

        let contacts = fx.store.campaigns.list_contacts(campaign.id).await.unwrap();
        let now = Utc::now();
        for cc in contacts.iter().take(2) {
            fx.store
                .campaigns
                .record_contact_engagement(campaign.id, cc.contact_id, EngagementKind::Opened, now, None)
                .await
                .unwrap();
        }
        fx.store
            .campaigns
            .record_contact_engagement(
                campaign.id,
                contacts[0].contact_id,
                EngagementKind::Clicked,
                now,
                Some("https://acme.test"),
            )
            .await
            .unwrap();

        let stats = fanout.stats(fx.owner.id, campaign.id).await.unwrap();
        assert_eq!(stats.recipients, 3);
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.clicked, 1);
        assert!((stats.open_rate - 66.666).abs() < 0.01);
        assert!((stats.click_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_of_zero_is_zero() {
        assert_eq!(percentage(3, 0), 0.0);
    }
}
