//! API routes

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{analytics, campaigns, drafts, health, send, templates, webhooks};
use crate::openapi::create_openapi_routes;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Provider callbacks authenticate by signature, not API key
    let webhook_routes = Router::new()
        .route("/mailgun", post(webhooks::mailgun))
        .with_state(state.clone());

    let contact_routes =
        Router::new().route("/:contact_id/send", post(send::send_to_contact));

    let send_routes = Router::new().route("/bulk", post(send::send_bulk));

    let delivery_routes = Router::new().route("/:delivery_id", get(send::get_delivery));

    let campaign_routes = Router::new()
        .route("/:campaign_id/send", post(campaigns::send_campaign))
        .route("/:campaign_id/stats", get(campaigns::campaign_stats));

    let draft_routes = Router::new()
        .route("/", post(drafts::create_draft))
        .route("/:draft_id", get(drafts::preview_draft))
        .route("/:draft_id", delete(drafts::discard_draft))
        .route("/:draft_id/confirm", post(drafts::confirm_draft));

    let template_routes = Router::new().route("/preview", post(templates::preview_template));

    let analytics_routes = Router::new()
        .route("/", get(analytics::summary))
        .route("/export", get(analytics::export));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/owners/:owner_id/contacts", contact_routes)
        .nest("/owners/:owner_id/send", send_routes)
        .nest("/owners/:owner_id/deliveries", delivery_routes)
        .nest("/owners/:owner_id/campaigns", campaign_routes)
        .nest("/owners/:owner_id/drafts", draft_routes)
        .nest("/owners/:owner_id/templates", template_routes)
        .nest("/owners/:owner_id/analytics", analytics_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics).with_state(state))
        .nest("/webhooks", webhook_routes)
        .nest("/api/v1", api_v1)
        .merge(create_openapi_routes())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_api_key;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use mailcrm_common::{signature, Config};
    use async_trait::async_trait;
    use mailcrm_core::{DeliveryGateway, GatewayError, LogGateway, Metrics, OutboundMessage};
    use mailcrm_storage::{CreateApiKey, CreateContact, CreateOwner, CreateTemplate, Store};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use uuid::Uuid;

    const API_KEY: &str = "mc_test_0123456789abcdef";
    const SIGNING_KEY: &str = "webhook-signing-key";

    /// Gateway whose provider refuses every mailbox
    struct RejectingGateway;

    #[async_trait]
    impl DeliveryGateway for RejectingGateway {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn send(&self, _message: &OutboundMessage) -> Result<String, GatewayError> {
            Err(GatewayError::Rejected {
                status: 550,
                message: "mailbox unavailable".to_string(),
            })
        }
    }

    struct Harness {
        server: TestServer,
        store: Store,
        owner_id: Uuid,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_gateway(Arc::new(LogGateway)).await
        }

        async fn with_gateway(gateway: Arc<dyn DeliveryGateway>) -> Self {
            let mut config = Config::default();
            config.webhook.signing_key = Some(SIGNING_KEY.to_string());

            let store = Store::memory();
            let metrics = Arc::new(Metrics::new().unwrap());
            let state = Arc::new(AppState::new(
                &config,
                store.clone(),
                gateway,
                metrics,
            ));

            let owner = store
                .owners
                .create(CreateOwner {
                    name: "Acme".to_string(),
                    from_name: Some("Acme Sales".to_string()),
                    from_address: Some("sales@acme.test".to_string()),
                })
                .await
                .unwrap();
            store
                .api_keys
                .create(CreateApiKey {
                    owner_id: owner.id,
                    name: "test".to_string(),
                    key_hash: hash_api_key(API_KEY),
                    key_prefix: API_KEY[..8].to_string(),
                    scopes: vec!["*".to_string()],
                    expires_at: None,
                })
                .await
                .unwrap();

            let server = TestServer::new(create_router(state)).unwrap();
            Self {
                server,
                store,
                owner_id: owner.id,
            }
        }

        fn bearer() -> HeaderValue {
            HeaderValue::from_str(&format!("Bearer {}", API_KEY)).unwrap()
        }

        async fn contact(&self, name: &str, email: &str) -> Uuid {
            self.store
                .contacts
                .create(CreateContact {
                    owner_id: self.owner_id,
                    name: name.to_string(),
                    email: email.to_string(),
                    company: Some("Globex".to_string()),
                    position: None,
                    phone: None,
                    notes: None,
                })
                .await
                .unwrap()
                .id
        }

        async fn template(&self, subject: &str, body: &str) -> Uuid {
            self.store
                .templates
                .create(CreateTemplate {
                    owner_id: self.owner_id,
                    name: "intro".to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                })
                .await
                .unwrap()
                .id
        }
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let h = Harness::new().await;
        let response = h.server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let h = Harness::new().await;
        let response = h
            .server
            .get(&format!("/api/v1/owners/{}/analytics", h.owner_id))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_owner_is_forbidden() {
        let h = Harness::new().await;
        let response = h
            .server
            .get(&format!("/api/v1/owners/{}/analytics", Uuid::new_v4()))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_send_to_contact_returns_created_record() {
        let h = Harness::new().await;
        let contact_id = h.contact("Dana Scully", "dana@globex.test").await;
        let template_id = h.template("Hello {{name}}", "Hi {{name}} at {{company}}").await;

        let response = h
            .server
            .post(&format!(
                "/api/v1/owners/{}/contacts/{}/send",
                h.owner_id, contact_id
            ))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({ "template_id": template_id }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["status"], "sent");
        assert_eq!(body["subject"], "Hello Dana Scully");
        assert_eq!(body["body"], "Hi Dana Scully at Globex");
        assert_eq!(body["to_address"], "dana@globex.test");
    }

    #[tokio::test]
    async fn test_failed_send_names_the_failed_record() {
        let h = Harness::with_gateway(Arc::new(RejectingGateway)).await;
        let contact_id = h.contact("Fox Mulder", "fox@globex.test").await;

        let response = h
            .server
            .post(&format!(
                "/api/v1/owners/{}/contacts/{}/send",
                h.owner_id, contact_id
            ))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({ "subject": "Hi", "body": "Body" }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "delivery_failed");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("mailbox unavailable"));

        let delivery_id: Uuid = body["delivery_id"].as_str().unwrap().parse().unwrap();
        let record = h.store.deliveries.get(delivery_id).await.unwrap().unwrap();
        assert_eq!(record.status, "failed");
        assert_eq!(record.contact_id, contact_id);
        assert!(record
            .status_detail
            .as_deref()
            .unwrap_or_default()
            .contains("mailbox unavailable"));
    }

    #[tokio::test]
    async fn test_bulk_without_recipients_is_bad_request() {
        let h = Harness::new().await;
        let template_id = h.template("Hello", "Body").await;

        let response = h
            .server
            .post(&format!("/api/v1/owners/{}/send/bulk", h.owner_id))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({ "contact_ids": [], "template_id": template_id }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_bulk_reports_unknown_contacts() {
        let h = Harness::new().await;
        let known = h.contact("Fox Mulder", "fox@globex.test").await;
        let unknown = Uuid::new_v4();
        let template_id = h.template("Hello {{name}}", "Body").await;

        let response = h
            .server
            .post(&format!("/api/v1/owners/{}/send/bulk", h.owner_id))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({ "contact_ids": [known, unknown], "template_id": template_id }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["sent_count"], 1);
        assert_eq!(body["errors"][0]["contact_id"], json!(unknown));
        assert_eq!(body["errors"][0]["error"], "Contact not found");
    }

    #[tokio::test]
    async fn test_template_preview_lists_unresolved_tokens() {
        let h = Harness::new().await;
        let contact_id = h.contact("Walter Skinner", "walter@globex.test").await;

        let response = h
            .server
            .post(&format!("/api/v1/owners/{}/templates/preview", h.owner_id))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({
                "contact_id": contact_id,
                "subject": "For {{name}}",
                "body": "Dear {{name}}, {{favourite_colour}}"
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["subject"], "For Walter Skinner");
        assert_eq!(body["unresolved"], json!(["{{favourite_colour}}"]));
        assert!(body["html"].as_str().unwrap().contains("Dear Walter Skinner"));
    }

    #[tokio::test]
    async fn test_export_rejects_unknown_format() {
        let h = Harness::new().await;
        let response = h
            .server
            .get(&format!("/api/v1/owners/{}/analytics/export", h.owner_id))
            .add_query_param("format", "xml")
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_is_an_attachment() {
        let h = Harness::new().await;
        let response = h
            .server
            .get(&format!("/api/v1/owners/{}/analytics/export", h.owner_id))
            .add_query_param("format", "json")
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .await;

        response.assert_status_ok();
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"email_analytics_"));
        assert!(disposition.ends_with(".json\""));
    }

    #[tokio::test]
    async fn test_webhook_with_bad_signature_is_unauthorized() {
        let h = Harness::new().await;
        let response = h
            .server
            .post("/webhooks/mailgun")
            .form(&[
                ("event", "opened"),
                ("timestamp", "1700000000"),
                ("token", "tok"),
                ("signature", "deadbeef"),
            ])
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_for_unknown_delivery_is_acknowledged() {
        let h = Harness::new().await;
        let sig = signature::sign(SIGNING_KEY, "1700000000", "tok").unwrap();
        let response = h
            .server
            .post("/webhooks/mailgun")
            .form(&[
                ("event", "opened"),
                ("timestamp", "1700000000"),
                ("token", "tok"),
                ("signature", sig.as_str()),
                ("variables", r#"{"tracking_id":"nobody"}"#),
            ])
            .await;

        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_webhook_open_updates_record() {
        let h = Harness::new().await;
        let contact_id = h.contact("Dana Scully", "dana@globex.test").await;
        let sent: Value = h
            .server
            .post(&format!(
                "/api/v1/owners/{}/contacts/{}/send",
                h.owner_id, contact_id
            ))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .json(&json!({ "subject": "Hi", "body": "Hello" }))
            .await
            .json();
        let tracking_id = sent["tracking_id"].as_str().unwrap().to_string();
        let delivery_id = sent["id"].as_str().unwrap().to_string();

        let sig = signature::sign(SIGNING_KEY, "1700000000", "tok").unwrap();
        let variables = json!({ "tracking_id": tracking_id }).to_string();
        h.server
            .post("/webhooks/mailgun")
            .form(&[
                ("event", "opened"),
                ("timestamp", "1700000000"),
                ("token", "tok"),
                ("signature", sig.as_str()),
                ("variables", variables.as_str()),
            ])
            .await
            .assert_status_ok();

        let record: Value = h
            .server
            .get(&format!(
                "/api/v1/owners/{}/deliveries/{}",
                h.owner_id, delivery_id
            ))
            .add_header(header::AUTHORIZATION, Harness::bearer())
            .await
            .json();
        assert_eq!(record["opened"], true);
        assert_eq!(record["open_count"], 1);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let h = Harness::new().await;
        let response = h.server.get("/openapi.json").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["openapi"], "3.0.3");
    }
}
