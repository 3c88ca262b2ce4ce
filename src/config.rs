use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::payment::PaymentProvider;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_YOCO_BASE_URL: &str = "https://payments.yoco.com";
const DEFAULT_STRIPE_BASE_URL: &str = "https://api.stripe.com";

/// Credentials for one payment gateway
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderCredentials {
    pub secret_key: String,
    pub webhook_secret: String,
    /// API root, overridable for sandboxes and tests
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Payment gateway configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    /// Provider used when a charge request names no method
    #[serde(default = "default_provider")]
    pub default_provider: PaymentProvider,

    /// Attempts per outbound gateway call (1-10)
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1, max = 10))]
    pub max_retries: u32,

    /// Base delay between attempts; doubles after every failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum age of a signed webhook timestamp
    #[serde(default = "default_webhook_tolerance_secs")]
    #[validate(range(min = 1))]
    pub webhook_tolerance_secs: u64,

    /// Where the hosted checkout sends the customer after paying
    #[serde(default = "default_success_url")]
    pub success_url: String,

    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,

    #[serde(default)]
    pub yoco: Option<ProviderCredentials>,

    #[serde(default)]
    pub stripe: Option<ProviderCredentials>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
            yoco: None,
            stripe: None,
        }
    }
}

impl PaymentConfig {
    pub fn credentials(&self, provider: PaymentProvider) -> Option<&ProviderCredentials> {
        match provider {
            PaymentProvider::Yoco => self.yoco.as_ref(),
            PaymentProvider::Stripe => self.stripe.as_ref(),
        }
    }

    pub fn base_url(&self, provider: PaymentProvider) -> String {
        let fallback = match provider {
            PaymentProvider::Yoco => DEFAULT_YOCO_BASE_URL,
            PaymentProvider::Stripe => DEFAULT_STRIPE_BASE_URL,
        };
        self.credentials(provider)
            .and_then(|creds| creds.base_url.clone())
            .unwrap_or_else(|| fallback.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO 4217 currency charged at the gateways
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Pending orders older than this are expired by the sweeper
    #[serde(default = "default_order_expiry_hours")]
    #[validate(range(min = 1))]
    pub order_expiry_hours: i64,

    /// How often the expiry sweeper runs
    #[serde(default = "default_expiry_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub expiry_sweep_interval_secs: u64,

    /// Points awarded per whole currency unit of physical products
    #[serde(default = "default_reward_points_per_unit")]
    #[validate(range(min = 0))]
    pub reward_points_per_unit: i64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub payments: PaymentConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            order_expiry_hours: default_order_expiry_hours(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            reward_points_per_unit: default_reward_points_per_unit(),
            event_channel_capacity: default_event_channel_capacity(),
            payments: PaymentConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url.starts_with("postgres")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self
            .payments
            .credentials(self.payments.default_provider)
            .is_none()
            && self.is_production()
        {
            let mut err = ValidationError::new("default_provider_unconfigured");
            err.message = Some(
                "The default payment provider has no credentials. Set APP__PAYMENTS__<PROVIDER>__SECRET_KEY and WEBHOOK_SECRET."
                    .into(),
            );
            errors.add("payments", err);
        }

        for provider in [PaymentProvider::Yoco, PaymentProvider::Stripe] {
            if let Some(creds) = self.payments.credentials(provider) {
                if creds.secret_key.trim().is_empty() || creds.webhook_secret.trim().is_empty() {
                    let mut err = ValidationError::new("provider_credentials_empty");
                    err.message = Some(
                        format!("{} credentials must not be empty", provider.as_ref()).into(),
                    );
                    errors.add("payments", err);
                }
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    "ZAR".to_string()
}

fn default_order_expiry_hours() -> i64 {
    48
}

fn default_expiry_sweep_interval_secs() -> u64 {
    300
}

fn default_reward_points_per_unit() -> i64 {
    1
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_provider() -> PaymentProvider {
    PaymentProvider::Yoco
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_success_url() -> String {
    "http://localhost:3000/checkout/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/checkout/cancel".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("courseware_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    // Optional OpenTelemetry export (APP__OTEL_ENABLED or OTEL_EXPORTER_OTLP_ENDPOINT)
    let otel_enabled = env::var("APP__OTEL_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
        || env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::{trace as sdktrace, Resource};

        let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4317".to_string());
        let service_name =
            env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "courseware-api".to_string());
        let resource = Resource::new(vec![KeyValue::new("service.name", service_name)]);

        let tracer = match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .with_trace_config(sdktrace::config().with_resource(resource))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => tracer,
            Err(err) => {
                error!("Failed to install OTLP pipeline: {}", err);
                if json {
                    let _ = fmt().with_env_filter(filter_directive).json().try_init();
                } else {
                    let _ = fmt().with_env_filter(filter_directive).try_init();
                }
                return;
            }
        };

        let base = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(EnvFilter::new(filter_directive));
        if json {
            let _ = base.with(fmt::layer().json()).try_init();
        } else {
            let _ = base.with(fmt::layer()).try_init();
        }
    } else if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", run_env);
    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://courseware.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        )
    }

    fn credentials() -> ProviderCredentials {
        ProviderCredentials {
            secret_key: "sk_test_123".into(),
            webhook_secret: "whsec_dGVzdA==".into(),
            base_url: None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.payments.default_provider, PaymentProvider::Yoco);
    }

    #[test]
    fn max_retries_is_bounded() {
        let mut cfg = base_config();
        cfg.payments.max_retries = 0;
        assert!(cfg.validate().is_err());

        cfg.payments.max_retries = 11;
        assert!(cfg.validate().is_err());

        cfg.payments.max_retries = 10;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn event_channel_needs_capacity() {
        let mut cfg = base_config();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());

        cfg.event_channel_capacity = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn currency_must_be_three_letters() {
        let mut cfg = base_config();
        cfg.currency = "RAND".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_requires_default_provider_credentials() {
        let mut cfg = base_config();
        cfg.environment = "production".into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.payments.yoco = Some(credentials());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn base_url_falls_back_per_provider() {
        let mut cfg = PaymentConfig::default();
        assert_eq!(cfg.base_url(PaymentProvider::Stripe), DEFAULT_STRIPE_BASE_URL);

        cfg.yoco = Some(ProviderCredentials {
            base_url: Some("http://127.0.0.1:9999/".into()),
            ..credentials()
        });
        assert_eq!(cfg.base_url(PaymentProvider::Yoco), "http://127.0.0.1:9999");
    }

    #[test]
    fn loads_layered_file_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
                database_url = "sqlite::memory:"
                currency = "USD"
                order_expiry_hours = 12

                [payments]
                default_provider = "stripe"
                max_retries = 5

                [payments.stripe]
                secret_key = "sk_test_abc"
                webhook_secret = "whsec_abc"
            "#,
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.currency, "USD");
        assert_eq!(cfg.order_expiry_hours, 12);
        assert_eq!(cfg.payments.default_provider, PaymentProvider::Stripe);
        assert_eq!(cfg.payments.max_retries, 5);
        assert!(cfg.payments.stripe.is_some());
        assert!(cfg.payments.yoco.is_none());
    }
}
