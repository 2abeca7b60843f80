//! Mailgun HTTP API gateway

use super::{DeliveryGateway, GatewayError, OutboundMessage};
use async_trait::async_trait;
use mailcrm_common::config::MailgunConfig;
use mailcrm_common::types::normalize_message_id;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Gateway posting to the Mailgun messages endpoint
pub struct MailgunGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl MailgunGateway {
    pub fn new(config: &MailgunConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v3/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.domain
            ),
            api_key: config.api_key.clone(),
        })
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[async_trait]
impl DeliveryGateway for MailgunGateway {
    fn name(&self) -> &'static str {
        "mailgun"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        let tracking = message.track_opens || message.track_clicks;
        let form = [
            ("from", message.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.body.as_str()),
            ("o:tracking", yes_no(tracking)),
            ("o:tracking-opens", yes_no(message.track_opens)),
            ("o:tracking-clicks", yes_no(message.track_clicks)),
            ("v:tracking_id", message.tracking_id.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("Unexpected response: {}", e)))?;
        debug!(message_id = %body.id, "Mailgun accepted message");

        Ok(normalize_message_id(&body.id))
    }
}
