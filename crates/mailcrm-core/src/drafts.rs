//! Send drafts: staged bulk sends that are previewed before confirmation

use crate::dispatch::{BulkSendReport, DispatchEngine, MessageContent};
use chrono::{DateTime, Duration, Utc};
use mailcrm_common::types::{ActivityKind, ContactId, DraftId, OwnerId, TemplateId};
use mailcrm_common::{Error, Result};
use mailcrm_storage::models::{CreateDraft, SendDraft};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Request to stage a bulk send
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDraftRequest {
    #[serde(default)]
    pub contact_ids: Vec<ContactId>,
    pub template_id: Option<TemplateId>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// One recipient's resolved content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientPreview {
    pub contact_id: ContactId,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub html: String,
    /// Placeholders that will be sent verbatim
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftPreview {
    pub draft_id: DraftId,
    pub expires_at: DateTime<Utc>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub recipients: Vec<RecipientPreview>,
    /// Staged ids that no longer resolve to a contact
    pub missing_contact_ids: Vec<ContactId>,
}

pub struct DraftService {
    engine: Arc<DispatchEngine>,
    ttl: Duration,
}

impl DraftService {
    pub fn new(engine: Arc<DispatchEngine>, ttl_minutes: i64) -> Self {
        Self {
            engine,
            ttl: Duration::minutes(ttl_minutes.max(1)),
        }
    }

    pub async fn create(
        &self,
        owner_id: OwnerId,
        request: CreateDraftRequest,
        now: DateTime<Utc>,
    ) -> Result<SendDraft> {
        if request.contact_ids.is_empty() {
            return Err(Error::Validation("contact_ids is required".to_string()));
        }
        let content = self
            .engine
            .resolve_content(owner_id, request.template_id, request.subject, request.body)
            .await?;

        let mut seen = HashSet::new();
        let contact_ids: Vec<ContactId> = request
            .contact_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        let draft = self
            .engine
            .store()
            .drafts
            .create(CreateDraft {
                owner_id,
                contact_ids,
                template_id: content.template_id,
                subject: content.subject,
                body: content.body,
                scheduled_time: request.scheduled_time,
                expires_at: now + self.ttl,
            })
            .await?;

        info!(draft_id = %draft.id, owner_id = %owner_id, recipients = draft.contact_ids.len(), "Draft created");
        Ok(draft)
    }

    async fn get_live(&self, owner_id: OwnerId, draft_id: DraftId, now: DateTime<Utc>) -> Result<SendDraft> {
        self.engine
            .store()
            .drafts
            .get_by_owner(owner_id, draft_id)
            .await?
            .filter(|d| !d.is_expired(now))
            .ok_or_else(|| Error::NotFound(format!("Draft {} not found", draft_id)))
    }

    /// Resolve the draft for every staged recipient without sending
    pub async fn preview(
        &self,
        owner_id: OwnerId,
        draft_id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<DraftPreview> {
        let draft = self.get_live(owner_id, draft_id, now).await?;
        let contacts = self
            .engine
            .store()
            .contacts
            .list_by_ids(owner_id, &draft.contact_ids)
            .await?;
        let found: HashSet<ContactId> = contacts.iter().map(|c| c.id).collect();

        let processor = self.engine.processor();
        let mut recipients = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let resolved = processor.resolve_message(&draft.subject, &draft.body, &contact, now);
            let mut unresolved = processor.unresolved_placeholders(&resolved.subject);
            for token in processor.unresolved_placeholders(&resolved.body) {
                if !unresolved.contains(&token) {
                    unresolved.push(token);
                }
            }
            recipients.push(RecipientPreview {
                contact_id: contact.id,
                name: contact.name,
                email: contact.email,
                html: processor.to_display_html(&resolved.body)?,
                subject: resolved.subject,
                body: resolved.body,
                unresolved,
            });
        }

        Ok(DraftPreview {
            draft_id: draft.id,
            expires_at: draft.expires_at,
            scheduled_time: draft.scheduled_time,
            missing_contact_ids: draft
                .contact_ids
                .iter()
                .filter(|id| !found.contains(id))
                .copied()
                .collect(),
            recipients,
        })
    }

    /// Send the draft and remove it
    pub async fn confirm(
        &self,
        owner_id: OwnerId,
        draft_id: DraftId,
        now: DateTime<Utc>,
    ) -> Result<BulkSendReport> {
        let draft = self.get_live(owner_id, draft_id, now).await?;

        // Deleting first makes a concurrent second confirm a no-op
        if !self.engine.store().drafts.delete(owner_id, draft_id).await? {
            return Err(Error::NotFound(format!("Draft {} not found", draft_id)));
        }

        let content = MessageContent {
            template_id: draft.template_id,
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            from: None,
        };
        let report = self
            .engine
            .dispatch_requested(owner_id, &draft.contact_ids, &content, draft.scheduled_time)
            .await?;

        self.engine
            .record_activity(
                owner_id,
                ActivityKind::DraftConfirmed { draft_id },
                format!(
                    "Draft confirmed: {} sent, {} scheduled, {} failed",
                    report.sent_count,
                    report.scheduled_count,
                    report.errors.len()
                ),
            )
            .await;

        Ok(report)
    }

    pub async fn discard(&self, owner_id: OwnerId, draft_id: DraftId) -> Result<()> {
        if self.engine.store().drafts.delete(owner_id, draft_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Draft {} not found", draft_id)))
        }
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.engine.store().drafts.delete_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn service(fx: &Fixture) -> DraftService {
        DraftService::new(fx.engine.clone(), 60)
    }

    #[tokio::test]
    async fn test_preview_then_confirm() {
        let fx = Fixture::new().await;
        let ada = fx.contact("Ada", "ada@example.com", Some("Acme"), None).await;
        let ghost = Uuid::new_v4();
        let drafts = service(&fx);
        let now = Utc::now();

        let draft = drafts
            .create(
                fx.owner.id,
                CreateDraftRequest {
                    contact_ids: vec![ada.id, ghost, ada.id],
                    subject: Some("Hi {{name}}".to_string()),
                    body: Some("From {{company}} {{unknown}}".to_string()),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(draft.contact_ids, vec![ada.id, ghost]);

        let preview = drafts.preview(fx.owner.id, draft.id, now).await.unwrap();
        assert_eq!(preview.recipients.len(), 1);
        assert_eq!(preview.recipients[0].subject, "Hi Ada");
        assert_eq!(preview.recipients[0].body, "From Acme {{unknown}}");
        assert_eq!(preview.recipients[0].unresolved, vec!["{{unknown}}".to_string()]);
        assert!(preview.recipients[0].html.contains("<p>From Acme {{unknown}}</p>"));
        assert_eq!(preview.missing_contact_ids, vec![ghost]);
        assert!(fx.gateway.sent().is_empty());

        let report = drafts.confirm(fx.owner.id, draft.id, now).await.unwrap();
        assert_eq!(report.sent_count, 1);
        assert_eq!(report.errors.len(), 1);

        let again = drafts.confirm(fx.owner.id, draft.id, now).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
        assert_eq!(fx.gateway.sent().len(), 1);

        let activities = fx.store.activities.list_by_owner(fx.owner.id, 1).await.unwrap();
        assert_eq!(activities[0].kind, "draft_confirmed");
    }

    #[tokio::test]
    async fn test_expired_draft_is_not_found() {
        let fx = Fixture::new().await;
        let ada = fx.contact("Ada", "ada@example.com", None, None).await;
        let drafts = service(&fx);
        let now = Utc::now();

        let draft = drafts
            .create(
                fx.owner.id,
                CreateDraftRequest {
                    contact_ids: vec![ada.id],
                    subject: Some("S".to_string()),
                    body: Some("B".to_string()),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();

        let later = now + Duration::minutes(61);
        assert!(matches!(
            drafts.preview(fx.owner.id, draft.id, later).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            drafts.confirm(fx.owner.id, draft.id, later).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(drafts.purge_expired(later).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discard_and_validation() {
        let fx = Fixture::new().await;
        let ada = fx.contact("Ada", "ada@example.com", None, None).await;
        let drafts = service(&fx);
        let now = Utc::now();

        let empty = drafts
            .create(fx.owner.id, CreateDraftRequest::default(), now)
            .await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let draft = drafts
            .create(
                fx.owner.id,
                CreateDraftRequest {
                    contact_ids: vec![ada.id],
                    subject: Some("S".to_string()),
                    body: Some("B".to_string()),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();

        let other_owner = Uuid::new_v4();
        assert!(matches!(
            drafts.discard(other_owner, draft.id).await,
            Err(Error::NotFound(_))
        ));
        drafts.discard(fx.owner.id, draft.id).await.unwrap();
        assert!(matches!(
            drafts.discard(fx.owner.id, draft.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
