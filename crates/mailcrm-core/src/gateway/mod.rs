//! Delivery Gateway - outbound email providers
//!
//! The dispatch engine only sees [`DeliveryGateway`]; which provider sits
//! behind it is decided by `gateway.kind` in the configuration.

mod mailgun;
mod smtp;

pub use mailgun::MailgunGateway;
pub use smtp::SmtpGateway;

use async_trait::async_trait;
use mailcrm_common::config::GatewayConfig;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// A fully resolved message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Correlation id echoed back by provider webhooks
    pub tracking_id: String,
    pub track_opens: bool,
    pub track_clicks: bool,
}

/// Gateway failures; the text is stored on the failed delivery record
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Outbound email provider
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Submit one message, returning the provider's message id
    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError>;
}

/// Gateway that only logs; for local development
#[derive(Debug, Default)]
pub struct LogGateway;

#[async_trait]
impl DeliveryGateway for LogGateway {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        let id = format!("{}@log.mailcrm", Uuid::new_v4());
        info!(
            to = %message.to,
            subject = %message.subject,
            tracking_id = %message.tracking_id,
            message_id = %id,
            "Email accepted by log gateway"
        );
        Ok(id)
    }
}

/// Build the configured gateway
pub fn from_config(
    config: &GatewayConfig,
    hostname: &str,
) -> mailcrm_common::Result<Arc<dyn DeliveryGateway>> {
    match config.kind.as_str() {
        "smtp" => {
            let gateway = SmtpGateway::new(&config.smtp, hostname)
                .map_err(|e| mailcrm_common::Error::Config(e.to_string()))?;
            Ok(Arc::new(gateway))
        }
        "mailgun" => {
            let mailgun = config.mailgun.as_ref().ok_or_else(|| {
                mailcrm_common::Error::Config("gateway.mailgun is not configured".to_string())
            })?;
            let gateway = MailgunGateway::new(mailgun)
                .map_err(|e| mailcrm_common::Error::Config(e.to_string()))?;
            Ok(Arc::new(gateway))
        }
        "log" => Ok(Arc::new(LogGateway)),
        other => Err(mailcrm_common::Error::Config(format!(
            "Unknown gateway kind: {}",
            other
        ))),
    }
}
