use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Full SQLite URL; when unset the database lives in `data_dir/dealdrop.db`
    pub database_url: Option<String>,
    #[serde(default)]
    pub environment: RunEnvironment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_url: None,
            environment: RunEnvironment::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Only an explicit `development` relaxes rate limits
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    Development,
    #[default]
    Production,
}

impl std::str::FromStr for RunEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(RunEnvironment::Development),
            "production" => Ok(RunEnvironment::Production),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry_hours")]
    pub jwt_expiry_hours: i64,
    /// Admin account created on startup when no admin exists yet
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_verification_ttl_hours")]
    pub verification_ttl_hours: i64,
    #[serde(default = "default_password_reset_ttl_minutes")]
    pub password_reset_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiry_hours: default_jwt_expiry_hours(),
            admin_email: None,
            admin_password: None,
            verification_ttl_hours: default_verification_ttl_hours(),
            password_reset_ttl_minutes: default_password_reset_ttl_minutes(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Tokens will not survive a restart with a generated secret
    uuid::Uuid::new_v4().to_string()
}

fn default_jwt_expiry_hours() -> i64 {
    24 * 7
}

fn default_verification_ttl_hours() -> i64 {
    24
}

fn default_password_reset_ttl_minutes() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    /// SMTP is usable only when a host and a sender are both known
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "DealDrop".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_url")]
    pub url: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: default_frontend_url(),
        }
    }
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    #[serde(default = "default_razorpay_api_base")]
    pub razorpay_api_base: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_api_base: default_razorpay_api_base(),
            currency: default_currency(),
        }
    }
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// Reverse the decrements of earlier cart lines when a later line is out of stock
    #[serde(default)]
    pub compensate_on_failure: bool,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    /// Orders with a subtotal strictly above this ship for free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: f64,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            compensate_on_failure: false,
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            shipping_fee: default_shipping_fee(),
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

fn default_tax_rate() -> f64 {
    0.08
}

fn default_free_shipping_threshold() -> f64 {
    500.0
}

fn default_shipping_fee() -> f64 {
    40.0
}

fn default_low_stock_threshold() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_webhook_requests")]
    pub webhook_requests_per_window: u32,
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Limit applied to every tier outside production
    #[serde(default = "default_development_requests")]
    pub development_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests(),
            webhook_requests_per_window: default_webhook_requests(),
            auth_requests_per_window: default_auth_requests(),
            development_requests_per_window: default_development_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_api_requests() -> u32 {
    100
}

fn default_webhook_requests() -> u32 {
    500
}

fn default_auth_requests() -> u32 {
    20
}

fn default_development_requests() -> u32 {
    10_000
}

fn default_window_seconds() -> u64 {
    15 * 60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());

        if config.payments.razorpay_key_secret.is_none() {
            warn!("Razorpay credentials not configured, payment endpoints will reject requests");
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Secrets and deployment-specific values can come from the environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("DEALDROP_ENV") {
            match env.parse() {
                Ok(environment) => self.server.environment = environment,
                Err(e) => warn!("Ignoring DEALDROP_ENV: {}", e),
            }
        }
        if let Some(url) = lookup("DEALDROP_DATABASE_URL") {
            self.server.database_url = Some(url);
        }
        if let Some(secret) = lookup("DEALDROP_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(url) = lookup("DEALDROP_FRONTEND_URL") {
            self.frontend.url = url;
        }
        if let Some(password) = lookup("DEALDROP_SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }
        if let Some(key_id) = lookup("DEALDROP_RAZORPAY_KEY_ID") {
            self.payments.razorpay_key_id = Some(key_id);
        }
        if let Some(secret) = lookup("DEALDROP_RAZORPAY_KEY_SECRET") {
            self.payments.razorpay_key_secret = Some(secret);
        }
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == RunEnvironment::Production
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            frontend: FrontendConfig::default(),
            payments: PaymentsConfig::default(),
            checkout: CheckoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
