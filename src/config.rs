use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use tracing::info;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Payment processor connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentProcessorConfig {
    /// Base URL of the processor HTTP API
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Shared secret used to verify webhook signatures
    pub webhook_secret: String,
    /// Accepted clock skew for webhook timestamps, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,
}

impl Default for PaymentProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            api_key: "test_api_key".to_string(),
            webhook_secret: "test_webhook_secret".to_string(),
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

/// A shipping method offered at checkout. Rate lookup is pure configuration
/// data, not business logic.
#[derive(Clone, Debug, Deserialize)]
pub struct ShippingMethodConfig {
    pub code: String,
    pub label: String,
    pub rate: Decimal,
    pub estimated_days: u32,
}

/// Reaper timers and retention windows.
#[derive(Clone, Debug, Deserialize)]
pub struct ReaperConfig {
    /// Payments PENDING longer than this are expired
    #[serde(default = "default_payment_expiry_hours")]
    pub payment_expiry_hours: i64,
    /// Sweep interval for abandoned payments, in seconds
    #[serde(default = "default_payment_sweep_secs")]
    pub payment_sweep_interval_secs: u64,
    /// Sweep interval for ledger pruning, in seconds
    #[serde(default = "default_prune_sweep_secs")]
    pub prune_interval_secs: u64,
    /// Ledger rows (stock movements, webhook events) older than this are pruned
    #[serde(default = "default_retention_days")]
    pub ledger_retention_days: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            payment_expiry_hours: default_payment_expiry_hours(),
            payment_sweep_interval_secs: default_payment_sweep_secs(),
            prune_interval_secs: default_prune_sweep_secs(),
            ledger_retention_days: default_retention_days(),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Storefront currency (ISO 4217)
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Tax rates keyed by destination country code, as fractions (0.0875 = 8.75%)
    #[serde(default = "default_tax_rates")]
    pub tax_rates: HashMap<String, Decimal>,

    /// Fallback tax rate when the destination country has no entry
    #[serde(default)]
    pub default_tax_rate: Decimal,

    /// Shipping methods offered at checkout
    #[serde(default = "default_shipping_methods")]
    pub shipping_methods: Vec<ShippingMethodConfig>,

    /// Bounded capacity of the domain event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    #[serde(default)]
    pub payment_processor: PaymentProcessorConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_webhook_tolerance() -> u64 {
    300
}
fn default_payment_expiry_hours() -> i64 {
    24
}
fn default_payment_sweep_secs() -> u64 {
    3600
}
fn default_prune_sweep_secs() -> u64 {
    86_400
}
fn default_retention_days() -> i64 {
    90
}
fn default_event_queue_capacity() -> usize {
    1024
}

fn default_tax_rates() -> HashMap<String, Decimal> {
    HashMap::new()
}

fn default_shipping_methods() -> Vec<ShippingMethodConfig> {
    use rust_decimal_macros::dec;
    vec![
        ShippingMethodConfig {
            code: "standard".to_string(),
            label: "Standard".to_string(),
            rate: dec!(10.00),
            estimated_days: 5,
        },
        ShippingMethodConfig {
            code: "express".to_string(),
            label: "Express".to_string(),
            rate: dec!(25.00),
            estimated_days: 2,
        },
    ]
}

impl AppConfig {
    /// Minimal in-code construction, used by tests and local tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            currency: default_currency(),
            tax_rates: HashMap::new(),
            default_tax_rate: Decimal::ZERO,
            shipping_methods: default_shipping_methods(),
            event_queue_capacity: default_event_queue_capacity(),
            payment_processor: PaymentProcessorConfig::default(),
            reaper: ReaperConfig::default(),
        }
    }

    /// Tax rate for a destination country, falling back to the default rate.
    pub fn tax_rate_for(&self, country_code: &str) -> Decimal {
        self.tax_rates
            .get(country_code)
            .copied()
            .unwrap_or(self.default_tax_rate)
    }

    /// Shipping method lookup by code.
    pub fn shipping_method(&self, code: &str) -> Option<&ShippingMethodConfig> {
        self.shipping_methods.iter().find(|m| m.code == code)
    }
}

/// Loads configuration from layered sources: defaults file, environment
/// overlay file, then `APP_`-prefixed environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment.clone())?
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    info!(environment = %config.environment, "configuration loaded");
    Ok(config)
}
