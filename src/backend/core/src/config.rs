//! Configuration management.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::authz::{PolicyRule, RolePolicyTable};
use crate::middleware::auth::AuthConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Optional override of the role policy table
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which row store backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// PostgreSQL connection URL
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Run embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret used to sign and verify tokens
    pub jwt_secret: Option<String>,

    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,

    pub issuer: Option<String>,

    pub audience: Option<String>,

    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Lifetime of tokens issued by the CLI
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: default_jwt_algorithm(),
            issuer: None,
            audience: None,
            leeway_secs: default_leeway(),
            public_paths: default_public_paths(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

impl AuthSettings {
    /// Middleware configuration for these settings.
    pub fn to_auth_config(&self) -> anyhow::Result<AuthConfig> {
        let algorithm = jsonwebtoken::Algorithm::from_str(&self.jwt_algorithm)
            .with_context(|| format!("unknown JWT algorithm {}", self.jwt_algorithm))?;

        let mut builder = AuthConfig::builder()
            .jwt_algorithm(algorithm)
            .leeway_secs(self.leeway_secs)
            .public_paths(self.public_paths.clone());
        if let Some(secret) = &self.jwt_secret {
            builder = builder.jwt_secret(secret.clone());
        }
        if let Some(issuer) = &self.issuer {
            builder = builder.issuer(issuer.clone());
        }
        if let Some(audience) = &self.audience {
            builder = builder.audience(audience.clone());
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: true,
        }
    }
}

/// Policy override: inline rules or a TOML file holding `[[rules]]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    pub file: Option<String>,
}

/// Shape of a standalone policy file.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyDocument {
    pub rules: Vec<PolicyRule>,
}

impl PolicyDocument {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse policy file {}", path.display()))
    }
}

impl PolicyConfig {
    /// Build the policy table, falling back to the standard one.
    ///
    /// Incomplete or duplicated rules are an error here, at startup.
    pub fn build_table(&self) -> anyhow::Result<RolePolicyTable> {
        let rules = match &self.file {
            Some(path) => PolicyDocument::from_file(path)?.rules,
            None => self.rules.clone(),
        };

        if rules.is_empty() {
            return Ok(RolePolicyTable::standard());
        }
        RolePolicyTable::from_rules(&rules).context("invalid policy table")
    }
}

/// Seed data for a fresh deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Super-admin created on startup when missing
    pub super_admin_id: Option<String>,

    #[serde(default = "default_admin_email")]
    pub super_admin_email: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            super_admin_id: None,
            super_admin_email: default_admin_email(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 5 }
fn default_true() -> bool { true }
fn default_jwt_algorithm() -> String { "HS256".to_string() }
fn default_leeway() -> u64 { 60 }
fn default_token_ttl() -> i64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_admin_email() -> String { "admin@localhost".to_string() }
fn default_public_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/metrics".to_string(),
        "/api/v1/public/*".to_string(),
    ]
}

impl Config {
    /// Load configuration from the environment (`BIZDASH__SECTION__KEY`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("BIZDASH").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("BIZDASH").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// `BIZDASH_CONFIG` names a file when set; otherwise environment only.
    pub fn load_default() -> anyhow::Result<Self> {
        match std::env::var("BIZDASH_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Self::load(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
