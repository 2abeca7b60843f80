//! Configuration for MailCRM

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound delivery gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Due-email poller configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Send draft configuration
    #[serde(default)]
    pub drafts: DraftConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Debug mode; disables webhook signature verification
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
            debug: false,
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Outbound delivery gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway kind: "smtp", "mailgun" or "log"
    #[serde(default = "default_gateway_kind")]
    pub kind: String,

    /// Sender address used when the owner has none configured
    #[serde(default = "default_from_address")]
    pub default_from: String,

    /// Ask the provider to track opens
    #[serde(default = "default_true")]
    pub track_opens: bool,

    /// Ask the provider to rewrite links for click tracking
    #[serde(default = "default_true")]
    pub track_clicks: bool,

    /// SMTP relay settings
    #[serde(default)]
    pub smtp: SmtpRelayConfig,

    /// Mailgun HTTP API settings
    pub mailgun: Option<MailgunConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: default_gateway_kind(),
            default_from: default_from_address(),
            track_opens: true,
            track_clicks: true,
            smtp: SmtpRelayConfig::default(),
            mailgun: None,
        }
    }
}

fn default_gateway_kind() -> String {
    "smtp".to_string()
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_true() -> bool {
    true
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpRelayConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Implicit TLS (SMTPS)
    #[serde(default)]
    pub use_tls: bool,

    /// Upgrade with STARTTLS
    #[serde(default = "default_true")]
    pub use_starttls: bool,

    /// Command timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpRelayConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: true,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Mailgun HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunConfig {
    /// API base URL
    #[serde(default = "default_mailgun_base")]
    pub api_base: String,

    /// Sending domain
    pub domain: String,

    /// Private API key
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_mailgun_timeout")]
    pub timeout_secs: u64,
}

fn default_mailgun_base() -> String {
    "https://api.mailgun.net".to_string()
}

fn default_mailgun_timeout() -> u64 {
    30
}

/// Provider webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// HMAC signing key shared with the provider
    pub signing_key: Option<String>,
}

/// Due-email poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the poller inside the API server process
    #[serde(default)]
    pub embedded: bool,

    /// Seconds between passes when embedded
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Records fetched per query
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Seconds after which an unfinished claim may be taken over
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            embedded: false,
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            claim_lease_secs: default_claim_lease(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_batch_size() -> i64 {
    100
}

fn default_claim_lease() -> i64 {
    15 * 60
}

/// Send draft configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftConfig {
    /// Minutes before an unconfirmed draft expires
    #[serde(default = "default_draft_ttl")]
    pub ttl_minutes: i64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_draft_ttl(),
        }
    }
}

fn default_draft_ttl() -> i64 {
    60
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first default location found, then apply
    /// `MAILCRM__SECTION__KEY` environment overrides.
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailcrm/config.toml"),
        ];

        let mut builder = config::Config::builder();
        if let Some(path) = paths.iter().find(|p| p.exists()) {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MAILCRM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the service unsafe or unusable
    pub fn validate(&self) -> crate::Result<()> {
        match self.database.backend.as_str() {
            "postgres" if self.database.url.is_none() => {
                return Err(crate::Error::Config(
                    "database.url is required for the postgres backend".to_string(),
                ));
            }
            "postgres" | "memory" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "Unknown database backend: {}",
                    other
                )));
            }
        }

        match self.gateway.kind.as_str() {
            "mailgun" if self.gateway.mailgun.is_none() => {
                return Err(crate::Error::Config(
                    "gateway.mailgun is required for the mailgun gateway".to_string(),
                ));
            }
            "smtp" | "mailgun" | "log" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "Unknown gateway kind: {}",
                    other
                )));
            }
        }

        if !self.server.debug && self.webhook.signing_key.is_none() {
            return Err(crate::Error::Config(
                "webhook.signing_key is required unless server.debug is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.hostname, "localhost");
        assert!(!server.debug);

        let scheduler = SchedulerConfig::default();
        assert!(!scheduler.embedded);
        assert_eq!(scheduler.claim_lease_secs, 900);

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.kind, "smtp");
        assert!(gateway.track_opens && gateway.track_clicks);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "crm.example.com"

[database]
backend = "postgres"
url = "postgres://localhost/mailcrm"

[gateway]
kind = "mailgun"
default_from = "hello@example.com"

[gateway.mailgun]
domain = "mg.example.com"
api_key = "key-123"

[webhook]
signing_key = "secret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "crm.example.com");
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.gateway.kind, "mailgun");
        let mailgun = config.gateway.mailgun.as_ref().unwrap();
        assert_eq!(mailgun.api_base, "https://api.mailgun.net");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_signing_key_outside_debug() {
        let toml = r#"
[database]
backend = "memory"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        config.server.debug = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_gateway() {
        let toml = r#"
[server]
debug = true

[database]
backend = "memory"

[gateway]
kind = "carrier-pigeon"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
