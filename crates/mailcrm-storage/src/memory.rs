//! In-memory storage backend
//!
//! Implements every repository trait over plain collections behind a single
//! lock. Used by the `memory` database backend and throughout the test
//! suites; semantics mirror the PostgreSQL queries.

use crate::models::*;
use crate::repository::contacts::order_by_request;
use crate::repository::{
    ActivityRepository, ApiKey, ApiKeyId, ApiKeyRepository, CampaignRepository, ContactRepository,
    CreateApiKey, DeliveryRecordRepository, DraftRepository, OwnerRepository, TemplateRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailcrm_common::types::{
    CampaignId, ContactId, ContactListId, DeliveryId, DeliveryStatus, DraftId, EngagementKind,
    OwnerId, TemplateId,
};
use mailcrm_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    owners: HashMap<OwnerId, Owner>,
    api_keys: Vec<ApiKey>,
    contacts: Vec<Contact>,
    lists: HashMap<ContactListId, ContactList>,
    list_members: Vec<(ContactListId, ContactId)>,
    templates: HashMap<TemplateId, EmailTemplate>,
    deliveries: Vec<DeliveryRecord>,
    campaigns: HashMap<CampaignId, Campaign>,
    campaign_contacts: Vec<CampaignContact>,
    activities: Vec<Activity>,
    drafts: HashMap<DraftId, SendDraft>,
}

impl Tables {
    fn delivery_mut(&mut self, id: DeliveryId) -> Option<&mut DeliveryRecord> {
        self.deliveries.iter_mut().find(|d| d.id == id)
    }

    fn campaign_contact_mut(
        &mut self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Option<&mut CampaignContact> {
        self.campaign_contacts
            .iter_mut()
            .find(|cc| cc.campaign_id == campaign_id && cc.contact_id == contact_id)
    }
}

/// In-memory implementation of all repositories
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn current_status(record: &DeliveryRecord) -> Result<DeliveryStatus> {
    record.status_enum().ok_or_else(|| {
        Error::Database(format!(
            "Delivery {} has unknown status {}",
            record.id, record.status
        ))
    })
}

fn advance(record: &mut DeliveryRecord, incoming: DeliveryStatus, at: DateTime<Utc>) -> Result<()> {
    let next = current_status(record)?.advance(incoming);
    record.status = next.as_str().to_string();
    record.updated_at = at;
    Ok(())
}

#[async_trait]
impl OwnerRepository for MemoryStore {
    async fn create(&self, input: CreateOwner) -> Result<Owner> {
        let owner = Owner {
            id: Uuid::new_v4(),
            name: input.name,
            from_name: input.from_name,
            from_address: input.from_address,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .owners
            .insert(owner.id, owner.clone());
        Ok(owner)
    }

    async fn get(&self, id: OwnerId) -> Result<Option<Owner>> {
        Ok(self.tables.read().await.owners.get(&id).cloned())
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn create(&self, input: CreateApiKey) -> Result<ApiKey> {
        let key = ApiKey {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            key_hash: input.key_hash,
            key_prefix: input.key_prefix,
            scopes: serde_json::json!(input.scopes),
            expires_at: input.expires_at,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.api_keys.push(key.clone());
        Ok(key)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let now = Utc::now();
        Ok(self
            .tables
            .read()
            .await
            .api_keys
            .iter()
            .filter(|k| k.key_prefix == prefix)
            .filter(|k| k.expires_at.map_or(true, |at| at > now))
            .take(10)
            .cloned()
            .collect())
    }

    async fn get(&self, id: ApiKeyId) -> Result<Option<ApiKey>> {
        Ok(self
            .tables
            .read()
            .await
            .api_keys
            .iter()
            .find(|k| k.id == id)
            .cloned())
    }

    async fn update_last_used(&self, id: ApiKeyId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(key) = tables.api_keys.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        let now = Utc::now();
        let contact = Contact {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            email: input.email,
            company: input.company,
            position: input.position,
            phone: input.phone,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: ContactId) -> Result<Option<Contact>> {
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .find(|c| c.id == id && c.owner_id == owner_id)
            .cloned())
    }

    async fn list_by_ids(&self, owner_id: OwnerId, ids: &[ContactId]) -> Result<Vec<Contact>> {
        let rows = self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner_id && ids.contains(&c.id))
            .cloned()
            .collect();
        Ok(order_by_request(ids, rows))
    }

    async fn list_by_filter(
        &self,
        owner_id: OwnerId,
        companies: &[String],
        positions: &[String],
    ) -> Result<Vec<Contact>> {
        fn matches(allowed: &[String], value: &Option<String>) -> bool {
            allowed.is_empty()
                || value
                    .as_ref()
                    .map_or(false, |v| allowed.iter().any(|a| a == v))
        }

        Ok(self
            .tables
            .read()
            .await
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .filter(|c| matches(companies, &c.company) && matches(positions, &c.position))
            .cloned()
            .collect())
    }

    async fn create_list(&self, owner_id: OwnerId, name: &str) -> Result<ContactList> {
        let list = ContactList {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.tables.write().await.lists.insert(list.id, list.clone());
        Ok(list)
    }

    async fn add_list_members(
        &self,
        list_id: ContactListId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if !tables.lists.contains_key(&list_id) {
            return Err(Error::Database(format!("Unknown contact list {}", list_id)));
        }
        let mut added = 0;
        for contact_id in contact_ids {
            if !tables.list_members.contains(&(list_id, *contact_id)) {
                tables.list_members.push((list_id, *contact_id));
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove_list_members(
        &self,
        list_id: ContactListId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.list_members.len();
        tables
            .list_members
            .retain(|(list, contact)| *list != list_id || !contact_ids.contains(contact));
        Ok((before - tables.list_members.len()) as u64)
    }

    async fn list_members(
        &self,
        owner_id: OwnerId,
        list_id: ContactListId,
    ) -> Result<Vec<Contact>> {
        let tables = self.tables.read().await;
        match tables.lists.get(&list_id) {
            Some(list) if list.owner_id == owner_id => {}
            _ => return Ok(Vec::new()),
        }
        Ok(tables
            .list_members
            .iter()
            .filter(|(list, _)| *list == list_id)
            .filter_map(|(_, contact_id)| {
                tables
                    .contacts
                    .iter()
                    .find(|c| c.id == *contact_id && c.owner_id == owner_id)
                    .cloned()
            })
            .collect())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn create(&self, input: CreateTemplate) -> Result<EmailTemplate> {
        let now = Utc::now();
        let template = EmailTemplate {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            subject: input.subject,
            body: input.body,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .templates
            .insert(template.id, template.clone());
        Ok(template)
    }

    async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: TemplateId,
    ) -> Result<Option<EmailTemplate>> {
        Ok(self
            .tables
            .read()
            .await
            .templates
            .get(&id)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }
}

#[async_trait]
impl DeliveryRecordRepository for MemoryStore {
    async fn create(&self, input: CreateDeliveryRecord) -> Result<DeliveryRecord> {
        let mut tables = self.tables.write().await;
        if let Some(tracking_id) = &input.tracking_id {
            if tables
                .deliveries
                .iter()
                .any(|d| d.tracking_id.as_ref() == Some(tracking_id))
            {
                return Err(Error::Database(format!(
                    "Duplicate tracking id {}",
                    tracking_id
                )));
            }
        }

        let now = Utc::now();
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            contact_id: input.contact_id,
            template_id: input.template_id,
            campaign_id: input.campaign_id,
            from_address: input.from_address,
            to_address: input.to_address,
            subject: input.subject,
            body: input.body,
            scheduled_time: input.scheduled_time,
            status: DeliveryStatus::Pending.as_str().to_string(),
            status_detail: None,
            tracking_id: input.tracking_id,
            provider_message_id: None,
            claimed_at: input.claimed_at,
            sent_at: None,
            opened: false,
            opened_at: None,
            open_count: 0,
            clicked: false,
            clicked_at: None,
            click_count: 0,
            created_at: now,
            updated_at: now,
        };
        tables.deliveries.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: DeliveryId,
    ) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .find(|d| d.id == id && d.owner_id == owner_id)
            .cloned())
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .find(|d| d.tracking_id.as_deref() == Some(tracking_id))
            .cloned())
    }

    async fn find_by_provider_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .rev()
            .find(|d| d.provider_message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryRecord>> {
        let tables = self.tables.read().await;
        let mut due: Vec<DeliveryRecord> = tables
            .deliveries
            .iter()
            .filter(|d| d.is_pending())
            .filter(|d| d.scheduled_time.map_or(false, |t| t <= now))
            .filter(|d| d.claimed_at.map_or(true, |c| c < lease_cutoff))
            .cloned()
            .collect();
        due.sort_by_key(|d| (d.scheduled_time, d.created_at));
        due.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn claim(
        &self,
        id: DeliveryId,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        tracking_id: &str,
    ) -> Result<Option<DeliveryRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.delivery_mut(id) else {
            return Ok(None);
        };
        let claimable = record.is_pending() && record.claimed_at.map_or(true, |c| c < lease_cutoff);
        if !claimable {
            return Ok(None);
        }
        record.claimed_at = Some(now);
        if record.tracking_id.is_none() {
            record.tracking_id = Some(tracking_id.to_string());
        }
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn mark_sent(
        &self,
        id: DeliveryId,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.delivery_mut(id) else {
            return Ok(None);
        };
        advance(record, DeliveryStatus::Sent, at)?;
        record.provider_message_id = Some(provider_message_id.to_string());
        record.sent_at = Some(at);
        Ok(Some(record.clone()))
    }

    async fn mark_failed(
        &self,
        id: DeliveryId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.delivery_mut(id) else {
            return Ok(None);
        };
        advance(record, DeliveryStatus::Failed, at)?;
        record.status_detail = Some(reason.to_string());
        Ok(Some(record.clone()))
    }

    async fn apply_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.delivery_mut(id) else {
            return Ok(None);
        };
        advance(record, status, at)?;
        Ok(Some(record.clone()))
    }

    async fn record_engagement(
        &self,
        id: DeliveryId,
        kind: EngagementKind,
        at: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.delivery_mut(id) else {
            return Ok(None);
        };
        match kind {
            EngagementKind::Opened => {
                record.opened = true;
                record.opened_at.get_or_insert(at);
                record.open_count += 1;
            }
            EngagementKind::Clicked => {
                record.clicked = true;
                record.clicked_at.get_or_insert(at);
                record.click_count += 1;
            }
        }
        record.updated_at = at;
        Ok(Some(record.clone()))
    }

    async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        limit: Option<i64>,
    ) -> Result<Vec<DeliveryRecord>> {
        let limit = limit
            .map(|l| usize::try_from(l.max(0)).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .rev()
            .filter(|d| d.owner_id == owner_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_pending_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .filter(|d| d.campaign_id == Some(campaign_id) && d.is_pending())
            .cloned()
            .collect())
    }

    async fn stats_by_owner(&self, owner_id: OwnerId) -> Result<DeliveryStats> {
        let tables = self.tables.read().await;
        let mut stats = DeliveryStats::default();
        for d in tables.deliveries.iter().filter(|d| d.owner_id == owner_id) {
            stats.total += 1;
            stats.opened += i64::from(d.opened);
            stats.clicked += i64::from(d.clicked);
        }
        Ok(stats)
    }

    async fn template_stats(&self, owner_id: OwnerId) -> Result<Vec<TemplateStat>> {
        let tables = self.tables.read().await;
        let mut by_template: Vec<TemplateStat> = Vec::new();
        for d in tables.deliveries.iter().filter(|d| d.owner_id == owner_id) {
            let index = match by_template
                .iter()
                .position(|s| s.template_id == d.template_id)
            {
                Some(index) => index,
                None => {
                    by_template.push(TemplateStat {
                        template_id: d.template_id,
                        template_name: d
                            .template_id
                            .and_then(|id| tables.templates.get(&id))
                            .map(|t| t.name.clone()),
                        sent: 0,
                        opened: 0,
                        clicked: 0,
                    });
                    by_template.len() - 1
                }
            };
            let stat = &mut by_template[index];
            stat.sent += 1;
            stat.opened += i64::from(d.opened);
            stat.clicked += i64::from(d.clicked);
        }
        by_template.sort_by(|a, b| {
            b.sent
                .cmp(&a.sent)
                .then_with(|| a.template_name.cmp(&b.template_name))
        });
        Ok(by_template)
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let selection = serde_json::to_value(&input.selection)
            .map_err(|e| Error::Internal(format!("Failed to encode selection: {}", e)))?;
        let campaign = Campaign {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            name: input.name,
            description: input.description,
            from_name: input.from_name,
            from_address: input.from_address,
            subject: input.subject,
            body: input.body,
            template_id: input.template_id,
            selection,
            scheduled_at: input.scheduled_at,
            is_sent: false,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self
            .tables
            .read()
            .await
            .campaigns
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn add_contacts(
        &self,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut inserted = 0;
        for contact_id in contact_ids {
            if tables.campaign_contact_mut(campaign_id, *contact_id).is_some() {
                continue;
            }
            tables.campaign_contacts.push(CampaignContact {
                id: Uuid::new_v4(),
                campaign_id,
                contact_id: *contact_id,
                is_sent: false,
                sent_at: None,
                opened: false,
                opened_at: None,
                opened_count: 0,
                clicked: false,
                clicked_at: None,
                clicked_count: 0,
                clicked_urls: serde_json::json!([]),
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_contacts(&self, campaign_id: CampaignId) -> Result<Vec<CampaignContact>> {
        Ok(self
            .tables
            .read()
            .await
            .campaign_contacts
            .iter()
            .filter(|cc| cc.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn remove_unsent_contacts(
        &self,
        campaign_id: CampaignId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.campaign_contacts.len();
        tables.campaign_contacts.retain(|cc| {
            cc.campaign_id != campaign_id || cc.is_sent || !contact_ids.contains(&cc.contact_id)
        });
        Ok((before - tables.campaign_contacts.len()) as u64)
    }

    async fn mark_contact_sent(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(cc) = tables.campaign_contact_mut(campaign_id, contact_id) {
            cc.is_sent = true;
            cc.sent_at.get_or_insert(at);
        }
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
        let mut tables = self.tables.write().await;
        let Some(cc) = tables.campaign_contact_mut(campaign_id, contact_id) else {
            return Ok(());
        };
        match kind {
            EngagementKind::Opened => {
                cc.opened = true;
                cc.opened_at.get_or_insert(at);
                cc.opened_count += 1;
            }
            EngagementKind::Clicked => {
                cc.clicked = true;
                cc.clicked_at.get_or_insert(at);
                cc.clicked_count += 1;
                if let Some(url) = url {
                    let mut urls = cc.clicked_urls_vec();
                    if !urls.iter().any(|u| u == url) {
                        urls.push(url.to_string());
                        cc.clicked_urls = serde_json::json!(urls);
                    }
                }
            }
        }
        Ok(())
    }

    async fn counts(&self, campaign_id: CampaignId) -> Result<CampaignCounts> {
        let tables = self.tables.read().await;
        let mut counts = CampaignCounts::default();
        for cc in tables
            .campaign_contacts
            .iter()
            .filter(|cc| cc.campaign_id == campaign_id)
        {
            counts.recipients += 1;
            counts.sent += i64::from(cc.is_sent);
            counts.opened += i64::from(cc.opened);
            counts.clicked += i64::from(cc.clicked);
        }
        Ok(counts)
    }

    async fn mark_sent(&self, campaign_id: CampaignId, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&campaign_id) {
            Some(campaign) if !campaign.is_sent => {
                campaign.is_sent = true;
                campaign.sent_at = Some(at);
                campaign.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn record(&self, input: CreateActivity) -> Result<Activity> {
        let details = serde_json::to_value(&input.kind)
            .map_err(|e| Error::Internal(format!("Failed to encode activity: {}", e)))?;
        let activity = Activity {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            kind: input.kind.name().to_string(),
            details,
            description: input.description,
            created_at: Utc::now(),
        };
        self.tables.write().await.activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_by_owner(&self, owner_id: OwnerId, limit: i64) -> Result<Vec<Activity>> {
        Ok(self
            .tables
            .read()
            .await
            .activities
            .iter()
            .rev()
            .filter(|a| a.owner_id == owner_id)
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DraftRepository for MemoryStore {
    async fn create(&self, input: CreateDraft) -> Result<SendDraft> {
        let draft = SendDraft {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            contact_ids: input.contact_ids,
            template_id: input.template_id,
            subject: input.subject,
            body: input.body,
            scheduled_time: input.scheduled_time,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .drafts
            .insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: DraftId) -> Result<Option<SendDraft>> {
        Ok(self
            .tables
            .read()
            .await
            .drafts
            .get(&id)
            .filter(|d| d.owner_id == owner_id)
            .cloned())
    }

    async fn delete(&self, owner_id: OwnerId, id: DraftId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .drafts
            .get(&id)
            .map_or(false, |d| d.owner_id == owner_id);
        if owned {
            tables.drafts.remove(&id);
        }
        Ok(owned)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.drafts.len();
        tables.drafts.retain(|_, d| !d.is_expired(now));
        Ok((before - tables.drafts.len()) as u64)
    }
}
