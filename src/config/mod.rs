//! Configuration management for registry-admission
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::Severity;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Registry backend configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Content trust (Notary) configuration
    #[serde(default)]
    pub trust: TrustConfig,

    /// Vulnerability scanning configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Project policy source
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix REGISTRY_ADMISSION_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("REGISTRY_ADMISSION_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("REGISTRY_ADMISSION_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }
        if let Ok(prefix) = std::env::var("REGISTRY_ADMISSION_PATH_PREFIX") {
            config.server.path_prefix = prefix;
        }

        if let Ok(url) = std::env::var("REGISTRY_ADMISSION_UPSTREAM_URL") {
            config.upstream.url = url;
        }

        if let Ok(enabled) = std::env::var("REGISTRY_ADMISSION_TRUST_ENABLED") {
            config.trust.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("REGISTRY_ADMISSION_TRUST_ENDPOINT") {
            config.trust.endpoint = endpoint;
        }
        if let Ok(prefix) = std::env::var("REGISTRY_ADMISSION_TRUST_GUN_PREFIX") {
            config.trust.gun_prefix = prefix;
        }

        if let Ok(enabled) = std::env::var("REGISTRY_ADMISSION_SCAN_ENABLED") {
            config.scan.enabled = enabled.parse().unwrap_or(false);
        }

        if let Ok(provider) = std::env::var("REGISTRY_ADMISSION_POLICY_PROVIDER") {
            config.policy.provider = provider
                .parse()
                .map_err(|e: String| ConfigError::InvalidValue(e))?;
        }

        if let Ok(path) = std::env::var("REGISTRY_ADMISSION_DATABASE_PATH") {
            config.database.path = path;
        }

        if let Ok(enabled) = std::env::var("REGISTRY_ADMISSION_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("REGISTRY_ADMISSION_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let Ok(level) = std::env::var("REGISTRY_ADMISSION_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.is_empty() {
            return Err(ConfigError::MissingRequired("upstream.url".to_string()));
        }
        if self.trust.enabled && self.trust.endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("trust.endpoint".to_string()));
        }
        if !self.server.path_prefix.is_empty() && !self.server.path_prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "server.path_prefix must start with '/': {}",
                self.server.path_prefix
            )));
        }
        if self.upstream.max_manifest_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "upstream.max_manifest_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix stripped from every request path before matching and forwarding
    #[serde(default)]
    pub path_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path_prefix: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Registry backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the registry backend
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Timeout for a single backend request in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Largest manifest body that will be buffered for inspection
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: default_upstream_timeout(),
            max_manifest_bytes: default_max_manifest_bytes(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://registry:5000".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_manifest_bytes() -> usize {
    4 * 1024 * 1024
}

/// Content trust configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrustConfig {
    /// Whether content trust is enforced at all
    #[serde(default)]
    pub enabled: bool,

    /// Notary server base URL
    #[serde(default = "default_trust_endpoint")]
    pub endpoint: String,

    /// Registry hostname used to build globally unique names (GUNs)
    #[serde(default)]
    pub gun_prefix: String,

    /// Principal the trust queries are made as
    #[serde(default = "default_trust_principal")]
    pub principal: String,

    /// Secret for the principal, if the token service requires one
    #[serde(default)]
    pub secret: Option<String>,

    /// Docker token service realm; requests are unauthenticated when unset
    #[serde(default)]
    pub token_service: Option<String>,

    /// `service` parameter sent to the token service
    #[serde(default = "default_token_service_name")]
    pub token_service_name: String,

    /// Timeout for trust service requests in seconds
    #[serde(default = "default_trust_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_trust_endpoint(),
            gun_prefix: String::new(),
            principal: default_trust_principal(),
            secret: None,
            token_service: None,
            token_service_name: default_token_service_name(),
            timeout_secs: default_trust_timeout(),
        }
    }
}

fn default_trust_endpoint() -> String {
    "http://notary-server:4443".to_string()
}

fn default_trust_principal() -> String {
    "registry-admission".to_string()
}

fn default_token_service_name() -> String {
    "notary".to_string()
}

fn default_trust_timeout() -> u64 {
    10
}

/// Vulnerability scanning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Whether vulnerability thresholds are enforced at all
    #[serde(default)]
    pub enabled: bool,
}

/// Where project policies come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
    /// Fixed toggles from the `policy.static` section
    #[default]
    Static,
    /// Fixed toggles from `PROJECT_*` environment variables
    Environment,
    /// Per-project settings from the database
    Store,
}

impl std::str::FromStr for PolicySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(PolicySource::Static),
            "environment" | "env" => Ok(PolicySource::Environment),
            "store" | "database" => Ok(PolicySource::Store),
            _ => Err(format!("Invalid policy provider: {}", s)),
        }
    }
}

/// Project policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    /// Which provider to construct at startup
    #[serde(default)]
    pub provider: PolicySource,

    /// Timeout for tenant store lookups in seconds
    #[serde(default = "default_policy_timeout")]
    pub timeout_secs: u64,

    /// Settings applied to every project by the static provider
    #[serde(default, rename = "static")]
    pub fixed: StaticPolicyConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            provider: PolicySource::default(),
            timeout_secs: default_policy_timeout(),
            fixed: StaticPolicyConfig::default(),
        }
    }
}

fn default_policy_timeout() -> u64 {
    5
}

/// Fixed policy toggles
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticPolicyConfig {
    /// Require signed images
    #[serde(default)]
    pub content_trust: bool,

    /// Enforce the severity threshold
    #[serde(default)]
    pub prevent_vulnerable: bool,

    /// Severity threshold
    #[serde(default)]
    pub severity: Severity,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "/data/db/registry-admission.db".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Whether to use insecure connection
    #[serde(default)]
    pub insecure: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "registry-admission".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
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
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
