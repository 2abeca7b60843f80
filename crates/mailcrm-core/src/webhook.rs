//! Webhook Event Reconciler
//!
//! Applies provider callbacks (opened, clicked, delivered, failed) to the
//! delivery record they reference. Every event is safe to apply repeatedly;
//! events for records this system does not know are acknowledged and
//! dropped.

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use mailcrm_common::signature;
use mailcrm_common::types::{
    normalize_message_id, DeliveryId, DeliveryStatus, EngagementKind, ProviderEvent,
};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::DeliveryRecord;
use mailcrm_storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Form-encoded provider callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "message-id")]
    pub message_id: Option<String>,
    /// JSON object carrying `tracking_id`
    pub variables: Option<String>,
    /// Clicked link
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Variables {
    tracking_id: Option<String>,
}

impl WebhookPayload {
    /// Tracking id from the `variables` blob; malformed JSON yields none
    pub fn tracking_id(&self) -> Option<String> {
        let raw = self.variables.as_deref()?;
        serde_json::from_str::<Variables>(raw)
            .ok()?
            .tracking_id
            .filter(|t| !t.is_empty())
    }
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub applied: bool,
    pub event: String,
    pub delivery_id: Option<DeliveryId>,
}

impl WebhookOutcome {
    fn ignored(event: &str) -> Self {
        Self {
            applied: false,
            event: event.to_string(),
            delivery_id: None,
        }
    }
}

/// Webhook event reconciler
pub struct WebhookReconciler {
    store: Store,
    signing_key: Option<String>,
    verify_signatures: bool,
    metrics: Option<Arc<Metrics>>,
}

impl WebhookReconciler {
    /// `verify_signatures = false` is the debug mode that accepts unsigned events
    pub fn new(store: Store, signing_key: Option<String>, verify_signatures: bool) -> Self {
        Self {
            store,
            signing_key,
            verify_signatures,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check the provider signature over `timestamp ++ token`
    pub fn verify(&self, payload: &WebhookPayload) -> Result<()> {
        if !self.verify_signatures {
            return Ok(());
        }
        let key = self
            .signing_key
            .as_deref()
            .ok_or_else(|| Error::Auth("Webhook signing key is not configured".to_string()))?;

        if signature::verify(key, &payload.timestamp, &payload.token, &payload.signature) {
            Ok(())
        } else {
            Err(Error::Auth("Invalid webhook signature".to_string()))
        }
    }

    /// Verify and apply a callback
    pub async fn handle(&self, payload: &WebhookPayload, now: DateTime<Utc>) -> Result<WebhookOutcome> {
        if let Err(e) = self.verify(payload) {
            warn!(event = %payload.event, "Rejected webhook with invalid signature");
            self.count(&payload.event, "rejected");
            return Err(e);
        }

        let outcome = self.apply(payload, now).await?;
        self.count(
            &outcome.event,
            if outcome.applied { "applied" } else { "ignored" },
        );
        Ok(outcome)
    }

    /// Apply a callback whose signature has already been checked
    pub async fn apply(&self, payload: &WebhookPayload, now: DateTime<Utc>) -> Result<WebhookOutcome> {
        let Some(event) = ProviderEvent::parse(&payload.event) else {
            debug!(event = %payload.event, "Ignoring unsupported webhook event");
            return Ok(WebhookOutcome::ignored(&payload.event));
        };

        let Some(record) = self.locate(payload).await? else {
            info!(
                event = event.as_str(),
                tracking_id = ?payload.tracking_id(),
                message_id = ?payload.message_id,
                "Webhook references unknown delivery"
            );
            return Ok(WebhookOutcome::ignored(event.as_str()));
        };

        let deliveries = &self.store.deliveries;
        match event {
            ProviderEvent::Opened | ProviderEvent::Clicked => {
                let kind = if event == ProviderEvent::Opened {
                    EngagementKind::Opened
                } else {
                    EngagementKind::Clicked
                };
                deliveries.record_engagement(record.id, kind, now).await?;

                if let Some(campaign_id) = record.campaign_id {
                    self.store
                        .campaigns
                        .record_contact_engagement(
                            campaign_id,
                            record.contact_id,
                            kind,
                            now,
                            payload.url.as_deref(),
                        )
                        .await?;
                }
            }
            ProviderEvent::Delivered => {
                deliveries
                    .apply_status(record.id, DeliveryStatus::Sent, now)
                    .await?;
            }
            ProviderEvent::Failed => {
                deliveries
                    .apply_status(record.id, DeliveryStatus::Failed, now)
                    .await?;
            }
        }

        info!(delivery_id = %record.id, event = event.as_str(), "Webhook event applied");
        Ok(WebhookOutcome {
            applied: true,
            event: event.as_str().to_string(),
            delivery_id: Some(record.id),
        })
    }

    /// Find the record by tracking id, falling back to the provider message id
    async fn locate(&self, payload: &WebhookPayload) -> Result<Option<DeliveryRecord>> {
        if let Some(tracking_id) = payload.tracking_id() {
            if let Some(record) = self.store.deliveries.find_by_tracking_id(&tracking_id).await? {
                return Ok(Some(record));
            }
        }

        match payload.message_id.as_deref().map(normalize_message_id) {
            Some(message_id) if !message_id.is_empty() => {
                self.store
                    .deliveries
                    .find_by_provider_message_id(&message_id)
                    .await
            }
            _ => Ok(None),
        }
    }

    fn count(&self, event: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            let event = ProviderEvent::parse(event).map_or("other", |e| e.as_str());
            metrics
                .webhook_events
                .with_label_values(&[event, outcome])
                .inc();
        }
    }
}
