//! Common types used throughout MailCRM

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner (tenant) ID type
pub type OwnerId = Uuid;

/// Contact ID type
pub type ContactId = Uuid;

/// Contact list ID type
pub type ContactListId = Uuid;

/// Email template ID type
pub type TemplateId = Uuid;

/// Delivery record ID type
pub type DeliveryId = Uuid;

/// Campaign ID type
pub type CampaignId = Uuid;

/// Send draft ID type
pub type DraftId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Lifecycle status of a delivery record.
///
/// Status only ever moves forward in the order `Pending < Sent < Failed`, no
/// matter which writer (synchronous send, poller, provider webhook) gets there
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Failed => 2,
        }
    }

    /// The status a record ends up in when `incoming` is reported while it is in `self`.
    pub fn advance(self, incoming: DeliveryStatus) -> DeliveryStatus {
        if incoming.rank() > self.rank() {
            incoming
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

/// Recipient engagement reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Opened,
    Clicked,
}

/// Provider event names understood by the webhook reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderEvent {
    Opened,
    Clicked,
    Delivered,
    Failed,
}

impl ProviderEvent {
    /// Parse a provider event name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "opened" => Some(ProviderEvent::Opened),
            "clicked" => Some(ProviderEvent::Clicked),
            "delivered" => Some(ProviderEvent::Delivered),
            "failed" => Some(ProviderEvent::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEvent::Opened => "opened",
            ProviderEvent::Clicked => "clicked",
            ProviderEvent::Delivered => "delivered",
            ProviderEvent::Failed => "failed",
        }
    }
}

/// How a campaign chooses its recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipientSelection {
    /// Every member of a contact list
    List { list_id: ContactListId },
    /// Owner contacts matching the attribute filter; an empty set leaves that
    /// attribute unconstrained
    Filter {
        #[serde(default)]
        companies: Vec<String>,
        #[serde(default)]
        positions: Vec<String>,
    },
}

/// Audit event recorded against an owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    EmailSent { delivery_id: DeliveryId },
    ScheduledEmailSent { delivery_id: DeliveryId },
    EmailScheduled { delivery_id: DeliveryId },
    EmailFailed { delivery_id: DeliveryId },
    CampaignSent { campaign_id: CampaignId },
    DraftConfirmed { draft_id: DraftId },
}

impl ActivityKind {
    /// Short machine-readable name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ActivityKind::EmailSent { .. } => "email_sent",
            ActivityKind::ScheduledEmailSent { .. } => "scheduled_email_sent",
            ActivityKind::EmailScheduled { .. } => "email_scheduled",
            ActivityKind::EmailFailed { .. } => "email_failed",
            ActivityKind::CampaignSent { .. } => "campaign_sent",
            ActivityKind::DraftConfirmed { .. } => "draft_confirmed",
        }
    }
}

/// Strip surrounding angle brackets and whitespace from a provider message id
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
