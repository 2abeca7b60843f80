//! SMTP relay gateway

use super::{DeliveryGateway, GatewayError, OutboundMessage};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailcrm_common::config::SmtpRelayConfig;
use mailcrm_common::types::normalize_message_id;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

macro_rules! tracking_header {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

tracking_header!(XMailgunTrack, "X-Mailgun-Track");
tracking_header!(XMailgunTrackOpens, "X-Mailgun-Track-Opens");
tracking_header!(XMailgunTrackClicks, "X-Mailgun-Track-Clicks");
tracking_header!(XMailgunVariables, "X-Mailgun-Variables");

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

/// Gateway submitting through an SMTP relay
pub struct SmtpGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpGateway {
    /// Build the relay transport; `hostname` is used for generated Message-IDs
    pub fn new(config: &SmtpRelayConfig, hostname: &str) -> Result<Self, GatewayError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| GatewayError::Transport(format!("Invalid relay: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| GatewayError::Transport(format!("Invalid relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            hostname: hostname.to_string(),
        })
    }

    fn build_message(&self, message: &OutboundMessage, message_id: &str) -> Result<Message, GatewayError> {
        let from: Mailbox = message
            .from
            .parse()
            .map_err(|e| GatewayError::InvalidAddress(format!("from {}: {}", message.from, e)))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| GatewayError::InvalidAddress(format!("to {}: {}", message.to, e)))?;

        let variables = serde_json::json!({ "tracking_id": message.tracking_id }).to_string();
        let tracking = message.track_opens || message.track_clicks;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .message_id(Some(format!("<{}>", message_id)))
            .header(XMailgunTrack(yes_no(tracking)))
            .header(XMailgunTrackOpens(yes_no(message.track_opens)))
            .header(XMailgunTrackClicks(yes_no(message.track_clicks)))
            .header(XMailgunVariables(variables))
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| GatewayError::Build(e.to_string()))
    }
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        let message_id = format!("{}.{}@{}", Uuid::new_v4(), Utc::now().timestamp(), self.hostname);
        let email = self.build_message(message, &message_id)?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(code = %response.code(), "SMTP relay accepted message");

        Ok(normalize_message_id(&message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> SmtpGateway {
        SmtpGateway::new(
            &SmtpRelayConfig {
                use_starttls: false,
                ..Default::default()
            },
            "crm.example.com",
        )
        .unwrap()
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            from: "Acme <sales@acme.test>".to_string(),
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Hi Ada".to_string(),
            tracking_id: "trk-1".to_string(),
            track_opens: true,
            track_clicks: false,
        }
    }

    #[tokio::test]
    async fn test_message_carries_tracking_headers() {
        let email = gateway().build_message(&message(), "abc@crm.example.com").unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();

        assert!(raw.contains("Message-ID: <abc@crm.example.com>"));
        assert!(raw.contains("X-Mailgun-Track: yes"));
        assert!(raw.contains("X-Mailgun-Track-Opens: yes"));
        assert!(raw.contains("X-Mailgun-Track-Clicks: no"));
        assert!(raw.contains("X-Mailgun-Variables:"));
        assert!(raw.contains("trk-1"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected_before_transport() {
        let mut msg = message();
        msg.to = "not an address".to_string();
        let err = gateway().send(&msg).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidAddress(_)));
    }
}
