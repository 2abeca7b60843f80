//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use mailcrm_common::config::Config;
use mailcrm_common::types::OwnerId;
use mailcrm_core::{
    AnalyticsService, CampaignFanout, DeliveryGateway, DispatchEngine, DraftService, DuePoller,
    Metrics, WebhookReconciler,
};
use mailcrm_storage::{ApiKey, Store};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Scope for endpoints that send email
pub const SCOPE_SEND: &str = "emails:send";
/// Scope for read-only endpoints
pub const SCOPE_READ: &str = "emails:read";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub engine: Arc<DispatchEngine>,
    pub fanout: Arc<CampaignFanout>,
    pub drafts: Arc<DraftService>,
    pub analytics: Arc<AnalyticsService>,
    pub webhooks: Arc<WebhookReconciler>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the dispatch services over one store and gateway
    pub fn new(
        config: &Config,
        store: Store,
        gateway: Arc<dyn DeliveryGateway>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let engine = Arc::new(
            DispatchEngine::new(store.clone(), gateway, &config.gateway)
                .with_metrics(metrics.clone()),
        );
        let webhooks = WebhookReconciler::new(
            store.clone(),
            config.webhook.signing_key.clone(),
            !config.server.debug,
        )
        .with_metrics(metrics.clone());

        Self {
            fanout: Arc::new(CampaignFanout::new(engine.clone())),
            drafts: Arc::new(DraftService::new(engine.clone(), config.drafts.ttl_minutes)),
            analytics: Arc::new(AnalyticsService::new(store.clone())),
            webhooks: Arc::new(webhooks),
            store,
            engine,
            metrics,
        }
    }

    /// Due poller sharing this state's engine
    pub fn poller(&self, config: &Config) -> DuePoller {
        DuePoller::new(self.engine.clone(), self.fanout.clone(), &config.scheduler)
    }
}

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The owner this API key belongs to
    pub owner_id: OwnerId,
    /// Scopes granted to this API key
    pub scopes: Vec<String>,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }

    pub fn is_authorized_for_owner(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
pub fn extract_key_prefix(api_key: &str) -> Option<&str> {
    api_key.get(..8)
}

/// Legacy SHA-256 hex hash of an API key
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored hash.
///
/// Supports Argon2 hashes (`$argon2...`) and legacy SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

async fn validate_api_key(store: &Store, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    let candidates = store.api_keys.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if candidate.is_expired() {
                warn!("API key {} has expired", candidate.id);
                return Err(StatusCode::UNAUTHORIZED);
            }

            // Fire and forget; auth does not depend on it
            let api_keys = store.api_keys.clone();
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = api_keys.update_last_used(key_id).await {
                    error!("Failed to update API key last_used_at: {}", e);
                }
            });

            debug!(
                "API key {} authenticated for owner {}",
                candidate.id, candidate.owner_id
            );
            return Ok(candidate);
        }
    }

    warn!("No matching API key for prefix: {}", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let validated_key = validate_api_key(&state.store, api_key).await?;

    request.extensions_mut().insert(AuthContext {
        owner_id: validated_key.owner_id,
        scopes: validated_key.scopes_vec(),
        api_key_id: validated_key.id,
    });

    Ok(next.run(request).await)
}

/// Reject requests for an owner other than the key's
pub fn require_owner_access(auth_context: &AuthContext, owner_id: OwnerId) -> Result<(), StatusCode> {
    if !auth_context.is_authorized_for_owner(owner_id) {
        warn!(
            "Owner access denied: API key owner {} tried to access owner {}",
            auth_context.owner_id, owner_id
        );
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

/// Reject requests whose key lacks `scope`
pub fn require_scope(auth_context: &AuthContext, scope: &str) -> Result<(), StatusCode> {
    if !auth_context.has_scope(scope) {
        warn!(
            "Scope access denied: API key {} lacks scope '{}'",
            auth_context.api_key_id, scope
        );
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    #[test]
    fn verifies_legacy_sha256_hash() {
        let api_key = "mc_test_legacy_key";
        let legacy_hash = hash_api_key(api_key);

        assert!(verify_api_key(api_key, &legacy_hash));
        assert!(!verify_api_key("wrong_key", &legacy_hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "mc_test_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(api_key.as_bytes(), &salt)
            .expect("argon2 hash generation should succeed")
            .to_string();

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn owner_and_scope_checks() {
        let ctx = AuthContext {
            owner_id: Uuid::new_v4(),
            scopes: vec![SCOPE_READ.to_string()],
            api_key_id: Uuid::new_v4(),
        };
        assert!(require_owner_access(&ctx, ctx.owner_id).is_ok());
        assert_eq!(
            require_owner_access(&ctx, Uuid::new_v4()),
            Err(StatusCode::FORBIDDEN)
        );
        assert!(require_scope(&ctx, SCOPE_READ).is_ok());
        assert_eq!(require_scope(&ctx, SCOPE_SEND), Err(StatusCode::FORBIDDEN));
    }
}
