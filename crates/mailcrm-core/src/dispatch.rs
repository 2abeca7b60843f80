//! Dispatch Engine - turns (contact, content) pairs into delivery records
//!
//! Every send persists a `pending` record before the gateway is called, so a
//! provider outage always leaves a `failed` record with the error text behind.
//! Bulk sends isolate failures per recipient and report them instead of
//! aborting the batch.

use crate::gateway::{DeliveryGateway, OutboundMessage};
use crate::metrics::Metrics;
use crate::template::TemplateProcessor;
use chrono::{DateTime, Utc};
use mailcrm_common::config::GatewayConfig;
use mailcrm_common::types::{ActivityKind, CampaignId, ContactId, OwnerId, TemplateId};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::{
    Contact, CreateActivity, CreateDeliveryRecord, DeliveryRecord, EmailTemplate,
};
use mailcrm_storage::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unresolved content to personalize per recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub template_id: Option<TemplateId>,
    pub subject: String,
    pub body: String,
    /// Sender override (campaign-level); falls back to the owner's address
    pub from: Option<String>,
}

impl From<&EmailTemplate> for MessageContent {
    fn from(template: &EmailTemplate) -> Self {
        Self {
            template_id: Some(template.id),
            subject: template.subject.clone(),
            body: template.body.clone(),
            from: None,
        }
    }
}

/// Single send request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendRequest {
    pub template_id: Option<TemplateId>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Bulk send request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkSendRequest {
    #[serde(default)]
    pub contact_ids: Vec<ContactId>,
    pub template_id: Option<TemplateId>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Per-recipient failure in a bulk send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientError {
    pub contact_id: ContactId,
    pub contact_name: Option<String>,
    pub error: String,
}

/// Partial-success summary of a bulk send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendReport {
    pub sent_count: usize,
    pub scheduled_count: usize,
    pub errors: Vec<RecipientError>,
}

impl BulkSendReport {
    pub fn message(&self) -> String {
        if self.scheduled_count > 0 {
            format!(
                "Successfully sent {} emails and scheduled {}",
                self.sent_count, self.scheduled_count
            )
        } else {
            format!("Successfully sent {} emails", self.sent_count)
        }
    }

    fn push_error(&mut self, contact_id: ContactId, contact_name: Option<String>, error: &Error) {
        let error = match error {
            Error::Delivery { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        self.push(contact_id, contact_name, error);
    }

    pub(crate) fn push(&mut self, contact_id: ContactId, contact_name: Option<String>, error: String) {
        self.errors.push(RecipientError {
            contact_id,
            contact_name,
            error,
        });
    }
}

/// Which path submitted a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Immediate,
    Scheduled,
}

impl DispatchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchPath::Immediate => "immediate",
            DispatchPath::Scheduled => "scheduled",
        }
    }
}

/// Dispatch engine
pub struct DispatchEngine {
    store: Store,
    gateway: Arc<dyn DeliveryGateway>,
    processor: TemplateProcessor,
    default_from: String,
    track_opens: bool,
    track_clicks: bool,
    metrics: Option<Arc<Metrics>>,
}

impl DispatchEngine {
    pub fn new(store: Store, gateway: Arc<dyn DeliveryGateway>, config: &GatewayConfig) -> Self {
        Self {
            store,
            gateway,
            processor: TemplateProcessor::new(),
            default_from: config.default_from.clone(),
            track_opens: config.track_opens,
            track_clicks: config.track_clicks,
            metrics: None,
        }
    }

    /// Attach metrics collection
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn processor(&self) -> &TemplateProcessor {
        &self.processor
    }

    /// Build content from an optional template plus explicit overrides
    pub async fn resolve_content(
        &self,
        owner_id: OwnerId,
        template_id: Option<TemplateId>,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<MessageContent> {
        let mut content = match template_id {
            Some(id) => {
                let template = self
                    .store
                    .templates
                    .get_by_owner(owner_id, id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Template {} not found", id)))?;
                MessageContent::from(&template)
            }
            None => MessageContent {
                template_id: None,
                subject: String::new(),
                body: String::new(),
                from: None,
            },
        };

        if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
            content.subject = subject;
        }
        if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
            content.body = body;
        }

        if content.subject.trim().is_empty() {
            return Err(Error::Validation("subject is required".to_string()));
        }
        if content.body.trim().is_empty() {
            return Err(Error::Validation("body is required".to_string()));
        }

        Ok(content)
    }

    /// Sender mailbox for an owner, honoring a content-level override
    async fn sender_for(&self, owner_id: OwnerId, content: &MessageContent) -> Result<String> {
        if let Some(from) = &content.from {
            return Ok(from.clone());
        }
        let owner = self.store.owners.get(owner_id).await?;
        Ok(owner
            .and_then(|o| o.sender())
            .unwrap_or_else(|| self.default_from.clone()))
    }

    /// Send to one owner contact immediately
    pub async fn send_to_contact(
        &self,
        owner_id: OwnerId,
        contact_id: ContactId,
        request: SendRequest,
    ) -> Result<DeliveryRecord> {
        let contact = self
            .store
            .contacts
            .get_by_owner(owner_id, contact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Contact {} not found", contact_id)))?;

        let content = self
            .resolve_content(owner_id, request.template_id, request.subject, request.body)
            .await?;

        self.send_one(owner_id, &contact, &content, None).await
    }

    /// Resolve, persist and submit one message. On gateway failure the
    /// record is marked `failed` and `Error::Delivery` is returned.
    pub async fn send_one(
        &self,
        owner_id: OwnerId,
        contact: &Contact,
        content: &MessageContent,
        campaign_id: Option<CampaignId>,
    ) -> Result<DeliveryRecord> {
        let from = self.sender_for(owner_id, content).await?;
        self.send_from(owner_id, &from, contact, content, campaign_id, Utc::now())
            .await
    }

    async fn send_from(
        &self,
        owner_id: OwnerId,
        from: &str,
        contact: &Contact,
        content: &MessageContent,
        campaign_id: Option<CampaignId>,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        let resolved = self
            .processor
            .resolve_message(&content.subject, &content.body, contact, now);

        let record = self
            .store
            .deliveries
            .create(CreateDeliveryRecord {
                owner_id,
                contact_id: contact.id,
                template_id: content.template_id,
                campaign_id,
                from_address: from.to_string(),
                to_address: contact.email.clone(),
                subject: resolved.subject,
                body: resolved.body,
                scheduled_time: None,
                tracking_id: Some(Uuid::new_v4().to_string()),
                claimed_at: Some(now),
            })
            .await?;

        self.deliver(&record, DispatchPath::Immediate).await
    }

    /// Persist a `pending` record for the poller to pick up at `at`
    async fn schedule_from(
        &self,
        owner_id: OwnerId,
        from: &str,
        contact: &Contact,
        content: &MessageContent,
        campaign_id: Option<CampaignId>,
        at: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        // Date tokens freeze at scheduling time along with the rest of the content
        let resolved = self
            .processor
            .resolve_message(&content.subject, &content.body, contact, Utc::now());

        let record = self
            .store
            .deliveries
            .create(CreateDeliveryRecord {
                owner_id,
                contact_id: contact.id,
                template_id: content.template_id,
                campaign_id,
                from_address: from.to_string(),
                to_address: contact.email.clone(),
                subject: resolved.subject,
                body: resolved.body,
                scheduled_time: Some(at),
                tracking_id: None,
                claimed_at: None,
            })
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.emails_scheduled.inc();
        }
        self.record_activity(
            owner_id,
            ActivityKind::EmailScheduled {
                delivery_id: record.id,
            },
            format!(
                "Email to {} scheduled for {}: {}",
                record.to_address,
                at.to_rfc3339(),
                record.subject
            ),
        )
        .await;

        Ok(record)
    }

    /// Submit a claimed record through the gateway and record the outcome
    pub async fn deliver(
        &self,
        record: &DeliveryRecord,
        path: DispatchPath,
    ) -> Result<DeliveryRecord> {
        let tracking_id = record.tracking_id.clone().ok_or_else(|| {
            Error::Internal(format!("Delivery {} has no tracking id", record.id))
        })?;

        let message = OutboundMessage {
            from: record.from_address.clone(),
            to: record.to_address.clone(),
            subject: record.subject.clone(),
            body: record.body.clone(),
            tracking_id,
            track_opens: self.track_opens,
            track_clicks: self.track_clicks,
        };

        debug!(
            delivery_id = %record.id,
            gateway = self.gateway.name(),
            path = path.as_str(),
            "Submitting email"
        );

        match self.gateway.send(&message).await {
            Ok(provider_message_id) => {
                let now = Utc::now();
                let updated = self
                    .store
                    .deliveries
                    .mark_sent(record.id, &provider_message_id, now)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("Delivery {} disappeared", record.id))
                    })?;

                if let Some(campaign_id) = record.campaign_id {
                    self.store
                        .campaigns
                        .mark_contact_sent(campaign_id, record.contact_id, now)
                        .await?;
                }

                if let Some(metrics) = &self.metrics {
                    metrics.emails_sent.with_label_values(&[path.as_str()]).inc();
                }

                let kind = match path {
                    DispatchPath::Immediate => ActivityKind::EmailSent {
                        delivery_id: record.id,
                    },
                    DispatchPath::Scheduled => ActivityKind::ScheduledEmailSent {
                        delivery_id: record.id,
                    },
                };
                self.record_activity(
                    record.owner_id,
                    kind,
                    format!("Email sent to {}: {}", record.to_address, record.subject),
                )
                .await;

                info!(
                    delivery_id = %record.id,
                    owner_id = %record.owner_id,
                    provider_message_id = %provider_message_id,
                    "Email sent"
                );
                Ok(updated)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    delivery_id = %record.id,
                    owner_id = %record.owner_id,
                    error = %reason,
                    "Email delivery failed"
                );

                self.store
                    .deliveries
                    .mark_failed(record.id, &reason, Utc::now())
                    .await?;

                if let Some(metrics) = &self.metrics {
                    metrics
                        .emails_failed
                        .with_label_values(&[path.as_str()])
                        .inc();
                }

                self.record_activity(
                    record.owner_id,
                    ActivityKind::EmailFailed {
                        delivery_id: record.id,
                    },
                    format!("Email to {} failed: {}", record.to_address, reason),
                )
                .await;

                Err(Error::Delivery {
                    delivery_id: record.id,
                    reason,
                })
            }
        }
    }

    /// Send one template to many contacts
    pub async fn send_bulk(
        &self,
        owner_id: OwnerId,
        request: BulkSendRequest,
    ) -> Result<BulkSendReport> {
        if request.contact_ids.is_empty() {
            return Err(Error::Validation("contact_ids is required".to_string()));
        }
        let template_id = request
            .template_id
            .ok_or_else(|| Error::Validation("template_id is required".to_string()))?;

        let template = self
            .store
            .templates
            .get_by_owner(owner_id, template_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Template {} not found", template_id)))?;

        self.dispatch_requested(
            owner_id,
            &request.contact_ids,
            &MessageContent::from(&template),
            request.scheduled_time,
        )
        .await
    }

    /// Look up the requested contacts and dispatch to each; ids that do not
    /// resolve to an owner contact are reported as errors
    pub async fn dispatch_requested(
        &self,
        owner_id: OwnerId,
        contact_ids: &[ContactId],
        content: &MessageContent,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> Result<BulkSendReport> {
        let contacts = self.store.contacts.list_by_ids(owner_id, contact_ids).await?;
        let found: HashSet<ContactId> = contacts.iter().map(|c| c.id).collect();

        let mut report = self
            .dispatch_to(owner_id, &contacts, content, scheduled_time, None)
            .await?;

        let mut reported = HashSet::new();
        for id in contact_ids {
            if !found.contains(id) && reported.insert(*id) {
                report.push(*id, None, "Contact not found".to_string());
            }
        }

        Ok(report)
    }

    /// Dispatch content to resolved contacts. A future `scheduled_time`
    /// defers every message to the due poller.
    pub async fn dispatch_to(
        &self,
        owner_id: OwnerId,
        contacts: &[Contact],
        content: &MessageContent,
        scheduled_time: Option<DateTime<Utc>>,
        campaign_id: Option<CampaignId>,
    ) -> Result<BulkSendReport> {
        let now = Utc::now();
        let deferred_until = scheduled_time.filter(|t| *t > now);
        let from = self.sender_for(owner_id, content).await?;

        let mut report = BulkSendReport::default();
        for contact in contacts {
            let outcome = match deferred_until {
                Some(at) => self
                    .schedule_from(owner_id, &from, contact, content, campaign_id, at)
                    .await
                    .map(|_| DispatchPath::Scheduled),
                None => self
                    .send_from(owner_id, &from, contact, content, campaign_id, Utc::now())
                    .await
                    .map(|_| DispatchPath::Immediate),
            };

            match outcome {
                Ok(DispatchPath::Immediate) => report.sent_count += 1,
                Ok(DispatchPath::Scheduled) => report.scheduled_count += 1,
                Err(e) => report.push_error(contact.id, Some(contact.name.clone()), &e),
            }
        }

        info!(
            owner_id = %owner_id,
            sent = report.sent_count,
            scheduled = report.scheduled_count,
            failed = report.errors.len(),
            "Bulk dispatch finished"
        );
        Ok(report)
    }

    /// Audit writes never fail the send they describe
    pub(crate) async fn record_activity(
        &self,
        owner_id: OwnerId,
        kind: ActivityKind,
        description: String,
    ) {
        let name = kind.name();
        if let Err(e) = self
            .store
            .activities
            .record(CreateActivity {
                owner_id,
                kind,
                description,
            })
            .await
        {
            warn!(owner_id = %owner_id, activity = name, error = %e, "Failed to record activity");
        }
    }
}
