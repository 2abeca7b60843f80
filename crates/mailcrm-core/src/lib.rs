//! MailCRM Core - email dispatch, scheduling, campaigns and event reconciliation
//!
//! This crate turns templates and contacts into tracked delivery records,
//! submits them through a delivery gateway, and folds provider webhooks back
//! into the records they reference.

pub mod analytics;
pub mod campaigns;
pub mod dispatch;
pub mod drafts;
pub mod gateway;
pub mod metrics;
pub mod scheduler;
pub mod template;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use analytics::{AnalyticsService, AnalyticsSummary, ExportFile, ExportFormat};
pub use campaigns::{CampaignFanout, CampaignSendReport, CampaignStats};
pub use dispatch::{
    BulkSendReport, BulkSendRequest, DispatchEngine, DispatchPath, MessageContent,
    RecipientError, SendRequest,
};
pub use drafts::{CreateDraftRequest, DraftPreview, DraftService, RecipientPreview};
pub use gateway::{DeliveryGateway, GatewayError, LogGateway, MailgunGateway, OutboundMessage, SmtpGateway};
pub use metrics::Metrics;
pub use scheduler::{DuePassSummary, DuePoller};
pub use template::{ResolvedMessage, TemplateProcessor};
pub use webhook::{WebhookOutcome, WebhookPayload, WebhookReconciler};
