//! Database models

use chrono::{DateTime, Utc};
use mailcrm_common::types::{
    ActivityKind, CampaignId, ContactId, ContactListId, DeliveryId, DeliveryStatus, DraftId,
    OwnerId, RecipientSelection, TemplateId,
};
use mailcrm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Owner (tenant) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    /// Formatted sender mailbox, if the owner configured one
    pub fn sender(&self) -> Option<String> {
        let address = self.from_address.as_deref()?;
        Some(format_mailbox(self.from_name.as_deref(), address))
    }
}

/// Input for creating an owner
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOwner {
    pub name: String,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
}

/// Contact model
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub owner_id: OwnerId,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a contact
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateContact {
    pub owner_id: OwnerId,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Contact list model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContactList {
    pub id: ContactListId,
    pub owner_id: OwnerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Email template model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: TemplateId,
    pub owner_id: OwnerId,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an email template
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub owner_id: OwnerId,
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Delivery record model: one outbound email to one contact
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub owner_id: OwnerId,
    pub contact_id: ContactId,
    pub template_id: Option<TemplateId>,
    pub campaign_id: Option<CampaignId>,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: String,
    pub status_detail: Option<String>,
    pub tracking_id: Option<String>,
    pub provider_message_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Get status as enum
    pub fn status_enum(&self) -> Option<DeliveryStatus> {
        self.status.parse().ok()
    }

    pub fn is_pending(&self) -> bool {
        self.status_enum() == Some(DeliveryStatus::Pending)
    }
}

/// Input for creating a delivery record; records are always born `pending`
#[derive(Debug, Clone)]
pub struct CreateDeliveryRecord {
    pub owner_id: OwnerId,
    pub contact_id: ContactId,
    pub template_id: Option<TemplateId>,
    pub campaign_id: Option<CampaignId>,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub tracking_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Owner-wide engagement totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: i64,
    pub opened: i64,
    pub clicked: i64,
}

/// Engagement totals for one template
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TemplateStat {
    pub template_id: Option<TemplateId>,
    pub template_name: Option<String>,
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    pub subject: String,
    pub body: String,
    pub template_id: Option<TemplateId>,
    pub selection: serde_json::Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Decode the stored recipient selection
    pub fn selection(&self) -> Result<RecipientSelection> {
        serde_json::from_value(self.selection.clone()).map_err(|e| {
            Error::Internal(format!(
                "Campaign {} has an invalid recipient selection: {}",
                self.id, e
            ))
        })
    }

    /// Formatted sender mailbox, if the campaign overrides it
    pub fn sender(&self) -> Option<String> {
        let address = self.from_address.as_deref()?;
        Some(format_mailbox(self.from_name.as_deref(), address))
    }
}

/// Input for creating a campaign
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    pub from_name: Option<String>,
    pub from_address: Option<String>,
    pub subject: String,
    pub body: String,
    pub template_id: Option<TemplateId>,
    pub selection: RecipientSelection,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Per-recipient campaign progress and engagement
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub opened_count: i32,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub clicked_count: i32,
    pub clicked_urls: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CampaignContact {
    /// Get clicked URLs as a vector
    pub fn clicked_urls_vec(&self) -> Vec<String> {
        serde_json::from_value(self.clicked_urls.clone()).unwrap_or_default()
    }
}

/// Aggregate campaign progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CampaignCounts {
    pub recipients: i64,
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
}

/// Activity (audit) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub kind: String,
    pub details: serde_json::Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Decode the typed event
    pub fn kind_enum(&self) -> Option<ActivityKind> {
        serde_json::from_value(self.details.clone()).ok()
    }
}

/// Input for recording an activity
#[derive(Debug, Clone)]
pub struct CreateActivity {
    pub owner_id: OwnerId,
    pub kind: ActivityKind,
    pub description: String,
}

/// Staged bulk send awaiting confirmation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendDraft {
    pub id: DraftId,
    pub owner_id: OwnerId,
    pub contact_ids: Vec<ContactId>,
    pub template_id: Option<TemplateId>,
    pub subject: String,
    pub body: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SendDraft {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for creating a send draft
#[derive(Debug, Clone)]
pub struct CreateDraft {
    pub owner_id: OwnerId,
    pub contact_ids: Vec<ContactId>,
    pub template_id: Option<TemplateId>,
    pub subject: String,
    pub body: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => format!("{} <{}>", name.trim(), address),
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_sender_formatting() {
        let mut owner = Owner {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            from_name: Some("Acme Sales".to_string()),
            from_address: Some("sales@acme.test".to_string()),
            created_at: Utc::now(),
        };
        assert_eq!(owner.sender().as_deref(), Some("Acme Sales <sales@acme.test>"));

        owner.from_name = None;
        assert_eq!(owner.sender().as_deref(), Some("sales@acme.test"));

        owner.from_address = None;
        assert_eq!(owner.sender(), None);
    }

    #[test]
    fn test_clicked_urls_vec_tolerates_bad_json() {
        let contact = CampaignContact {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            is_sent: true,
            sent_at: None,
            opened: false,
            opened_at: None,
            opened_count: 0,
            clicked: true,
            clicked_at: None,
            clicked_count: 1,
            clicked_urls: serde_json::json!({"not": "a list"}),
            created_at: Utc::now(),
        };
        assert!(contact.clicked_urls_vec().is_empty());
    }
}
