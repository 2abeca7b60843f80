//! Shared fixtures for service tests

use crate::dispatch::DispatchEngine;
use crate::gateway::{DeliveryGateway, GatewayError, OutboundMessage};
use async_trait::async_trait;
use mailcrm_common::config::GatewayConfig;
use mailcrm_storage::models::{Contact, CreateContact, CreateOwner, CreateTemplate, EmailTemplate, Owner};
use mailcrm_storage::Store;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Gateway that records submissions and fails for chosen recipients
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedGateway {
    pub(crate) fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, GatewayError> {
        if self.failing.lock().unwrap().contains(&message.to) {
            return Err(GatewayError::Rejected {
                status: 550,
                message: "mailbox unavailable".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("msg-{}@scripted.test", sent.len()))
    }
}

pub(crate) struct Fixture {
    pub store: Store,
    pub gateway: Arc<ScriptedGateway>,
    pub engine: Arc<DispatchEngine>,
    pub owner: Owner,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        Self::with_sender(None, None).await
    }

    pub(crate) async fn with_sender(from_name: Option<&str>, from_address: Option<&str>) -> Self {
        let store = Store::memory();
        let gateway = Arc::new(ScriptedGateway::default());
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            gateway.clone(),
            &GatewayConfig::default(),
        ));
        let owner = store
            .owners
            .create(CreateOwner {
                name: "Acme".to_string(),
                from_name: from_name.map(str::to_string),
                from_address: from_address.map(str::to_string),
            })
            .await
            .unwrap();

        Self {
            store,
            gateway,
            engine,
            owner,
        }
    }

    pub(crate) async fn contact(
        &self,
        name: &str,
        email: &str,
        company: Option<&str>,
        position: Option<&str>,
    ) -> Contact {
        self.store
            .contacts
            .create(CreateContact {
                owner_id: self.owner.id,
                name: name.to_string(),
                email: email.to_string(),
                company: company.map(str::to_string),
                position: position.map(str::to_string),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub(crate) async fn template(&self, subject: &str, body: &str) -> EmailTemplate {
        self.store
            .templates
            .create(CreateTemplate {
                owner_id: self.owner.id,
                name: format!("{} template", subject),
                subject: subject.to_string(),
                body: body.to_string(),
            })
            .await
            .unwrap()
    }
}
