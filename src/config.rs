use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::payments::CheckoutFlow;

const MAX_ORDER_RETENTION_HOURS: u64 = 8760;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_CART_STORAGE_DIR: &str = "data/carts";
const DEFAULT_EMAIL_FROM: &str = "Haveli <orders@havelirestaurant.com>";

/// Which payment provider backs checkout
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    /// In-process fake provider, never charges anything
    Sandbox,
}

/// Where session carts are persisted between requests
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CartStorageKind {
    Memory,
    File,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
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

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// Upper bound on handling time for a single HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Public URL of the storefront, used to build payment return URLs
    #[serde(default = "default_public_base_url")]
    #[validate(url)]
    pub public_base_url: String,

    /// Lower-case ISO 4217 currency code for every charge
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Sales tax as a decimal fraction (0.075 = 7.5%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: Decimal,

    /// Hosted redirect page or embedded payment form
    #[serde(default = "default_checkout_flow")]
    pub checkout_flow: CheckoutFlow,

    #[serde(default = "default_payment_provider")]
    pub payment_provider: PaymentProviderKind,

    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Handed to the presentation layer for the embedded payment form
    #[serde(default)]
    pub stripe_publishable_key: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    #[validate(url)]
    pub stripe_api_base: String,

    /// Timeout for a single payment provider call
    #[serde(default = "default_payment_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub payment_timeout_secs: u64,

    /// Number of failures before circuit breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failure_threshold: u32,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,

    /// Successful probes needed to close a half-open circuit
    #[serde(default = "default_circuit_breaker_successes")]
    pub circuit_breaker_success_threshold: u32,

    #[serde(default = "default_cart_storage")]
    pub cart_storage: CartStorageKind,

    /// Directory holding one JSON file per cart session when `cart_storage = "file"`
    #[serde(default = "default_cart_storage_dir")]
    pub cart_storage_dir: String,

    /// Saved carts untouched this long are dropped from memory; storage keeps them
    #[serde(default = "default_cart_idle_secs")]
    #[validate(range(min = 1))]
    pub cart_idle_secs: u64,

    /// Order attempts not updated for this long are forgotten
    #[serde(default = "default_order_retention_hours")]
    #[validate(range(min = 25, max = 8760))]
    pub order_retention_hours: u64,

    /// How often idle carts and old order attempts are swept
    #[serde(default = "default_session_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub session_sweep_interval_secs: u64,

    /// Email provider identifier ("resend"); empty disables delivery
    #[serde(default)]
    pub email_provider: Option<String>,

    #[serde(default)]
    pub email_api_key: Option<String>,

    #[serde(default = "default_email_from")]
    pub email_from: String,

    /// Staff inbox receiving contact and catering notifications
    #[serde(default)]
    pub email_to: Option<String>,

    #[serde(default)]
    pub send_contact_email: bool,

    #[serde(default)]
    pub send_catering_email: bool,

    #[serde(default)]
    pub catering_deposit_enabled: bool,

    #[serde(default = "default_catering_deposit_cents")]
    pub catering_deposit_cents: i64,

    /// Offset of the restaurant's local time from UTC, for opening hours
    #[serde(default = "default_restaurant_utc_offset_minutes")]
    #[validate(range(min = -720, max = 840))]
    pub restaurant_utc_offset_minutes: i32,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the bind address and environment
    pub fn new(host: String, port: u16, environment: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            request_timeout_secs: default_request_timeout_secs(),
            public_base_url: default_public_base_url(),
            currency: default_currency(),
            tax_rate: default_tax_rate(),
            checkout_flow: default_checkout_flow(),
            payment_provider: default_payment_provider(),
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_api_base: default_stripe_api_base(),
            payment_timeout_secs: default_payment_timeout_secs(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
            circuit_breaker_success_threshold: default_circuit_breaker_successes(),
            cart_storage: default_cart_storage(),
            cart_storage_dir: default_cart_storage_dir(),
            cart_idle_secs: default_cart_idle_secs(),
            order_retention_hours: default_order_retention_hours(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            email_provider: None,
            email_api_key: None,
            email_from: default_email_from(),
            email_to: None,
            send_contact_email: false,
            send_catering_email: false,
            catering_deposit_enabled: false,
            catering_deposit_cents: default_catering_deposit_cents(),
            restaurant_utc_offset_minutes: default_restaurant_utc_offset_minutes(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn cart_idle(&self) -> Duration {
        Duration::from_secs(self.cart_idle_secs)
    }

    pub fn order_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.order_retention_hours.min(MAX_ORDER_RETENTION_HOURS) as i64)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    pub fn cart_storage_path(&self) -> PathBuf {
        PathBuf::from(&self.cart_storage_dir)
    }

    /// Currency normalized to the lower-case form payment providers expect
    pub fn currency_code(&self) -> String {
        self.currency.trim().to_ascii_lowercase()
    }

    /// Trimmed Stripe secret, if one is configured
    pub fn stripe_secret(&self) -> Option<&str> {
        self.stripe_secret_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether outbound email is possible at all
    pub fn email_enabled(&self) -> bool {
        let has_provider = self
            .email_provider
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        let has_key = self
            .email_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        has_provider && has_key && self.email_to.is_some()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.payment_provider == PaymentProviderKind::Stripe && self.stripe_secret().is_none() {
            let mut err = ValidationError::new("stripe_secret_key_required");
            err.message = Some(
                "APP__STRIPE_SECRET_KEY must be set when payment_provider = \"stripe\"".into(),
            );
            errors.add("stripe_secret_key", err);
        }

        if self.is_production() && self.payment_provider == PaymentProviderKind::Sandbox {
            let mut err = ValidationError::new("sandbox_payments_in_production");
            err.message = Some("The sandbox payment provider cannot be used in production".into());
            errors.add("payment_provider", err);
        }

        if self.catering_deposit_enabled && self.catering_deposit_cents <= 0 {
            let mut err = ValidationError::new("catering_deposit_cents");
            err.message = Some("catering_deposit_cents must be positive when deposits are enabled".into());
            errors.add("catering_deposit_cents", err);
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

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_public_base_url() -> String {
    DEFAULT_PUBLIC_BASE_URL.to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_tax_rate() -> Decimal {
    dec!(0.075)
}

fn default_checkout_flow() -> CheckoutFlow {
    CheckoutFlow::Hosted
}

fn default_payment_provider() -> PaymentProviderKind {
    PaymentProviderKind::Sandbox
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_payment_timeout_secs() -> u64 {
    10
}

fn default_circuit_breaker_failures() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

fn default_circuit_breaker_successes() -> u32 {
    1
}

fn default_cart_storage() -> CartStorageKind {
    CartStorageKind::Memory
}

fn default_cart_storage_dir() -> String {
    DEFAULT_CART_STORAGE_DIR.to_string()
}

fn default_cart_idle_secs() -> u64 {
    1800
}

fn default_order_retention_hours() -> u64 {
    48
}

fn default_session_sweep_interval_secs() -> u64 {
    60
}

fn default_email_from() -> String {
    DEFAULT_EMAIL_FROM.to_string()
}

fn default_catering_deposit_cents() -> i64 {
    5000
}

fn default_restaurant_utc_offset_minutes() -> i32 {
    -300
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

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("haveli_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
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

/// Same as [`load_config`], reading TOML files from `config_dir`
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod constraint_tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new("127.0.0.1".into(), 8080, "production".into())
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("cors_allowed_origins"));
    }

    #[test]
    fn non_dev_with_origins_and_stripe_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://havelirestaurant.com".into());
        cfg.payment_provider = PaymentProviderKind::Stripe;
        cfg.stripe_secret_key = Some("sk_test_123".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn stripe_provider_requires_secret_key() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.payment_provider = PaymentProviderKind::Stripe;
        cfg.stripe_secret_key = Some("   ".into());
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("stripe_secret_key"));
    }

    #[test]
    fn sandbox_payments_are_rejected_in_production() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("payment_provider"));
    }

    #[test]
    fn development_defaults_are_valid() {
        let cfg = AppConfig::new("127.0.0.1".into(), 8080, "development".into());
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.tax_rate, dec!(0.075));
        assert_eq!(cfg.currency_code(), "usd");
    }

    #[test]
    fn tax_rate_must_be_a_fraction() {
        assert!(validate_tax_rate(&dec!(0.075)).is_ok());
        assert!(validate_tax_rate(&dec!(0)).is_ok());
        assert!(validate_tax_rate(&dec!(7.5)).is_err());
        assert!(validate_tax_rate(&dec!(-0.01)).is_err());
    }

    #[test]
    fn email_requires_provider_key_and_recipient() {
        let mut cfg = base_config();
        assert!(!cfg.email_enabled());
        cfg.email_provider = Some("resend".into());
        cfg.email_api_key = Some("re_123".into());
        assert!(!cfg.email_enabled());
        cfg.email_to = Some("owner@havelirestaurant.com".into());
        assert!(cfg.email_enabled());
    }
}
