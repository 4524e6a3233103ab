use serde::Deserialize;
use std::net::SocketAddr;

/// Application configuration.
///
/// Layered: `config/default.toml`, optional `config/local.toml`, then
/// environment variables prefixed `EC__` (e.g. `EC__DATABASE__URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub payments: PaymentsConfig,
    pub tickets: TicketsConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for request bodies, provider notifications included.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Payment provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// `http` talks to the provider; `mock` fakes sessions locally.
    #[serde(default = "default_checkout_provider")]
    pub provider: String,

    #[serde(default = "default_payments_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub secret_key: String,

    /// Secret for the `Payment-Signature` header on inbound notifications.
    pub webhook_signing_secret: String,

    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    #[serde(default = "default_success_url")]
    pub success_url: String,

    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,

    #[serde(default = "default_checkout_expiry_hours")]
    pub checkout_expiry_hours: i64,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Failed processing attempts before a notification is dead-lettered.
    #[serde(default = "default_max_notification_attempts")]
    pub max_notification_attempts: i32,

    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: i64,

    /// Minutes past `checkout_expires_at` before the expiry job fails a
    /// pending registration itself.
    #[serde(default = "default_expiry_grace_minutes")]
    pub expiry_grace_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketsConfig {
    /// HMAC key for verification payloads.
    pub signing_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reminder_batch_size")]
    pub batch_size: i64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_reminder_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_image_sweep_interval")]
    pub image_sweep_interval_minutes: u64,

    #[serde(default = "default_image_sweep_batch_size")]
    pub image_sweep_batch_size: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_sweep_interval_minutes: default_image_sweep_interval(),
            image_sweep_batch_size: default_image_sweep_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// `console` logs notifications; `mock` records them in memory.
    #[serde(default = "default_notification_provider")]
    pub provider: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            provider: default_notification_provider(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    1_048_576
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_checkout_provider() -> String {
    "http".to_string()
}
fn default_payments_base_url() -> String {
    "https://api.stripe.com".to_string()
}
fn default_signature_tolerance() -> i64 {
    300
}
fn default_success_url() -> String {
    "http://localhost:3000/registrations/success".to_string()
}
fn default_cancel_url() -> String {
    "http://localhost:3000/registrations/cancelled".to_string()
}
fn default_checkout_expiry_hours() -> i64 {
    24
}
fn default_provider_timeout() -> u64 {
    10
}
fn default_max_notification_attempts() -> i32 {
    10
}
fn default_retry_batch_size() -> i64 {
    50
}
fn default_expiry_grace_minutes() -> i32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_reminder_batch_size() -> i64 {
    500
}
fn default_image_sweep_interval() -> u64 {
    15
}
fn default_image_sweep_batch_size() -> i64 {
    100
}
fn default_notification_provider() -> String {
    "console".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("EC").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Builds a configuration from embedded defaults plus `overrides`.
    /// Validation is skipped so tests can use partial configs.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30
            max_body_size = 1048576

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [payments]
            provider = "mock"
            base_url = "http://localhost:12111"
            secret_key = "sk_test"
            webhook_signing_secret = "whsec_test"
            signature_tolerance_secs = 300
            checkout_expiry_hours = 24
            max_notification_attempts = 10
            retry_batch_size = 50
            expiry_grace_minutes = 60

            [tickets]
            signing_secret = "ticket-test-secret"

            [reminders]
            enabled = true
            batch_size = 500

            [jobs]
            enabled = false
            image_sweep_interval_minutes = 15
            image_sweep_batch_size = 100

            [notifications]
            provider = "mock"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "EC__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.payments.webhook_signing_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "EC__PAYMENTS__WEBHOOK_SIGNING_SECRET environment variable must be set"
                    .to_string(),
            ));
        }

        if self.tickets.signing_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "EC__TICKETS__SIGNING_SECRET environment variable must be set".to_string(),
            ));
        }

        if self.payments.provider == "http" && self.payments.secret_key.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "EC__PAYMENTS__SECRET_KEY must be set for the http checkout provider".to_string(),
            ));
        }

        if !matches!(self.payments.provider.as_str(), "http" | "mock") {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Unknown checkout provider: {}",
                self.payments.provider
            )));
        }

        if self.payments.max_notification_attempts < 1 {
            return Err(ConfigValidationError::InvalidValue(
                "max_notification_attempts must be at least 1".to_string(),
            ));
        }

        if self.payments.checkout_expiry_hours < 1 {
            return Err(ConfigValidationError::InvalidValue(
                "checkout_expiry_hours must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid socket address")
    }
}
