//! Configuration management for the Halal Certification Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with HALAL__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Certificate issuance settings
    pub certificates: CertificateConfig,

    /// Email notification provider
    pub notifications: NotificationConfig,

    /// Payment provider used to confirm application fees
    pub payments: PaymentConfig,

    /// Uploaded document storage
    pub documents: DocumentConfig,

    /// QR image rendering service
    pub qr: QrConfig,

    /// Administrator created on first start when no users exist
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdminConfig>,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL, or `memory` for the in-process store
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfig {
    /// Public base URL; verification links are `{base}/verify/{number}`
    pub verification_base_url: String,

    /// Attempts at drawing an unused certificate number before giving up
    pub max_number_attempts: u32,

    /// Validity window in days
    pub validity_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Email API endpoint; unset means notifications are only logged
    pub provider_url: Option<String>,

    /// Email API key
    pub api_key: Option<String>,

    /// Sender address
    pub from_address: String,

    /// Per-send timeout in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Payment provider API base URL
    pub provider_url: Option<String>,

    /// Payment provider API key
    pub api_key: Option<String>,

    /// Verification timeout in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    /// Directory holding uploaded files
    pub root_dir: String,

    /// Largest accepted upload in bytes
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QrConfig {
    /// Image service that renders `?data=<payload>` as a QR code
    pub renderer_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapAdminConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("HALAL_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = Self::builder_with_defaults(&environment)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (HALAL__ prefix)
            .add_source(
                Environment::with_prefix("HALAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    fn builder_with_defaults(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("environment", environment)?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.url", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.secret", "development-secret-key")?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("certificates.verification_base_url", "http://localhost:3000/api/v1")?
            .set_default("certificates.max_number_attempts", 10)?
            .set_default("certificates.validity_days", 365)?
            .set_default("notifications.from_address", "certification@localhost")?
            .set_default("notifications.timeout_ms", 5000)?
            .set_default("payments.timeout_ms", 5000)?
            .set_default("documents.root_dir", "./data/documents")?
            .set_default("documents.max_bytes", 10 * 1024 * 1024)?
            .set_default(
                "qr.renderer_url",
                "https://api.qrserver.com/v1/create-qr-code/",
            )?
            .set_default("logging.json", false)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
