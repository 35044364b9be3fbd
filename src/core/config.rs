//! Configuration management

use clap::Parser;
use config::{builder::DefaultState, Config as ConfigSource, ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default request body ceiling in bytes.
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 100_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid authentication configuration: {0}")]
    InvalidAuth(String),

    #[error("Invalid CORS configuration: {0}")]
    InvalidCors(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),

    #[error("Invalid security configuration: {0}")]
    InvalidSecurity(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// Hosting environment. Only `Development` turns on the documentation
/// endpoints and the permissive CORS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl AppEnvironment {
    pub fn is_development(&self) -> bool {
        matches!(self, AppEnvironment::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Staging => "staging",
            AppEnvironment::Production => "production",
        }
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::from_args(&cli_args)
    }

    /// Build configuration from already parsed command-line arguments
    pub fn from_args(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(ConfigSource::builder())?;

        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Environment variables are prefixed with API_ and use __ for nesting
        // Example: API_SERVER__PORT=8080, API_CORS__ALLOWED_ORIGINS=https://a.example,https://b.example
        builder = builder.add_source(environment_source());

        if let Some(environment) = cli_args.environment {
            builder = builder.set_override("environment", environment.as_str())?;
        }
        if let Some(host) = &cli_args.host {
            builder = builder.set_override("server.host", host.clone())?;
        }
        if let Some(port) = cli_args.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path layered over the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigSource::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults only, no file, environment or CLI input
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigSource::builder())?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.auth.validate()?;
        self.cors.validate(self.environment)?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.security.validate()?;
        Ok(())
    }
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("environment", "production")?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 5000)?
        .set_default("server.max_request_body_size", DEFAULT_MAX_REQUEST_BODY_SIZE as u64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.console", true)?
        .set_default("logging.file_enabled", true)?
        .set_default("logging.directory", "logs")?
        .set_default("logging.file_name", "api-log.txt")?
        .set_default("auth.authority", "http://localhost:8080/realms/master")?
        .set_default("auth.audience", "bootstrap-api")?
        .set_default("auth.valid_audiences", vec!["master-realm", "account"])?
        .set_default("auth.require_https_metadata", false)?
        .set_default("auth.validate_issuer", true)?
        .set_default("auth.validate_audience", true)?
        .set_default("auth.validate_lifetime", true)?
        .set_default("auth.leeway_secs", 60)?
        .set_default("auth.jwks_refresh_secs", 3600)?
        .set_default("auth.jwks_min_refresh_secs", 30)?
        .set_default("cors.allowed_origins", vec!["https://yourfrontend.com"])?
        .set_default("cors.allow_credentials", true)?
        .set_default("rate_limit.enabled", true)?
        .set_default("rate_limit.permit_limit", 10)?
        .set_default("rate_limit.window_secs", 60)?
        .set_default("rate_limit.queue_limit", 2)?
        .set_default("rate_limit.trust_forwarded_headers", false)?
        .set_default("cache.enabled", true)?
        .set_default("cache.max_entries", 1024)?
        .set_default("cache.max_body_size", 1_048_576)?
        .set_default("security.blocked_ips", Vec::<String>::new())?
        .set_default("security.custom_headers", HashMap::<String, String>::new())?
        .set_default("security.https_redirect", false)?)
}

fn environment_source() -> Environment {
    Environment::with_prefix("API")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("auth.valid_audiences")
        .with_list_parse_key("cors.allowed_origins")
        .with_list_parse_key("security.blocked_ips")
        .try_parsing(true)
}

/// Command-line arguments for configuration override
#[derive(Debug, Default, Parser)]
#[command(name = "api-bootstrap")]
#[command(about = "Web API bootstrap server", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Hosting environment (development, staging, production)
    #[arg(short, long, value_enum, value_name = "ENV")]
    pub environment: Option<AppEnvironment>,

    /// Server host address
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_body_size: usize, // bytes
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidServer("host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidServer("port must be greater than 0".to_string()));
        }

        if self.max_request_body_size == 0 {
            return Err(ConfigError::InvalidServer(
                "max_request_body_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub console: bool,
    pub file_enabled: bool,
    pub directory: PathBuf,
    pub file_name: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        if !self.console && !self.file_enabled {
            return Err(ConfigError::InvalidLogging(
                "at least one of console or file_enabled must be true".to_string(),
            ));
        }

        if self.file_enabled && self.file_name.is_empty() {
            return Err(ConfigError::InvalidLogging(
                "file_name must be specified when file_enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token issuer; also the base of the OpenID discovery document
    pub authority: String,
    pub audience: String,
    pub valid_audiences: Vec<String>,
    pub require_https_metadata: bool,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
    /// Shared HMAC secret. When set, tokens are verified locally and the
    /// authority's key set is never fetched.
    #[serde(default)]
    pub signing_secret: Option<String>,
    pub leeway_secs: u64,
    pub jwks_refresh_secs: u64,
    pub jwks_min_refresh_secs: u64,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authority.is_empty() && self.signing_secret.is_none() {
            return Err(ConfigError::InvalidAuth(
                "either authority or signing_secret must be provided".to_string(),
            ));
        }

        if !self.authority.is_empty() {
            let parsed = url::Url::parse(&self.authority)
                .map_err(|e| ConfigError::InvalidAuth(format!("authority is not a valid URL: {}", e)))?;

            if self.require_https_metadata && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidAuth(
                    "authority must use https when require_https_metadata is true".to_string(),
                ));
            }
        }

        if matches!(&self.signing_secret, Some(secret) if secret.is_empty()) {
            return Err(ConfigError::InvalidAuth("signing_secret cannot be empty".to_string()));
        }

        if self.validate_audience && self.accepted_audiences().is_empty() {
            return Err(ConfigError::InvalidAuth(
                "audience must be provided when validate_audience is true".to_string(),
            ));
        }

        if self.jwks_refresh_secs == 0 {
            return Err(ConfigError::InvalidAuth("jwks_refresh_secs must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Primary audience followed by the additional accepted audiences
    pub fn accepted_audiences(&self) -> Vec<String> {
        std::iter::once(&self.audience)
            .chain(self.valid_audiences.iter())
            .filter(|aud| !aud.is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn validate(&self, environment: AppEnvironment) -> Result<(), ConfigError> {
        // Development always uses the permissive policy
        if environment.is_development() {
            return Ok(());
        }

        if self.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidCors("allowed_origins cannot be empty".to_string()));
        }

        if self.allow_credentials && self.allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidCors(
                "wildcard origin cannot be combined with allow_credentials".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub permit_limit: usize,
    pub window_secs: u64,
    pub queue_limit: usize,
    pub trust_forwarded_headers: bool,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permit_limit == 0 {
            return Err(ConfigError::InvalidRateLimit("permit_limit must be greater than 0".to_string()));
        }

        if self.window_secs == 0 {
            return Err(ConfigError::InvalidRateLimit("window_secs must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_body_size: usize, // bytes
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.max_entries == 0 {
            return Err(ConfigError::InvalidCache(
                "max_entries must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub blocked_ips: Vec<String>,
    /// Extra response headers added next to the fixed security headers
    pub custom_headers: HashMap<String, String>,
    pub https_redirect: bool,
    #[serde(default)]
    pub https_port: Option<u16>,
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for ip in &self.blocked_ips {
            ip.parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidSecurity(format!("invalid blocked ip: {}", ip)))?;
        }

        for (name, value) in &self.custom_headers {
            axum::http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidSecurity(format!("invalid header name: {}", name)))?;
            axum::http::HeaderValue::from_str(value)
                .map_err(|_| ConfigError::InvalidSecurity(format!("invalid value for header {}", name)))?;
        }

        Ok(())
    }

    pub fn blocked_addrs(&self) -> Vec<IpAddr> {
        self.blocked_ips.iter().filter_map(|ip| ip.parse().ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::defaults().unwrap();

        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.server.max_request_body_size, 100_000_000);
        assert_eq!(config.rate_limit.permit_limit, 10);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.queue_limit, 2);
        assert_eq!(config.auth.authority, "http://localhost:8080/realms/master");
        assert!(config.auth.signing_secret.is_none());
        assert!(config.logging.file_enabled);
    }

    #[test]
    fn test_environment_variable_naming() {
        let vars: config::Map<String, String> = [
            ("API_SERVER__PORT", "8081"),
            ("API_RATE_LIMIT__PERMIT_LIMIT", "25"),
            ("API__SERVER__HOST", "0.0.0.0"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        let config: Config = with_defaults(ConfigSource::builder())
            .unwrap()
            .add_source(environment_source().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.rate_limit.permit_limit, 25);
        // A doubled separator after the prefix is not a recognised key
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_accepted_audiences() {
        let config = Config::defaults().unwrap();
        assert_eq!(
            config.auth.accepted_audiences(),
            vec!["bootstrap-api", "master-realm", "account"]
        );
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
environment = "development"

[server]
port = 8081

[rate_limit]
permit_limit = 5
queue_limit = 0

[security]
blocked_ips = ["192.168.1.100"]

[security.custom_headers]
X-Custom-Header = "MyCustomHeaderValue"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert!(config.environment.is_development());
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.rate_limit.permit_limit, 5);
        assert_eq!(config.rate_limit.queue_limit, 0);
        assert_eq!(config.security.blocked_addrs(), vec!["192.168.1.100".parse::<IpAddr>().unwrap()]);
        // keys are normalised to lowercase by the config loader
        assert_eq!(
            config.security.custom_headers.get("x-custom-header").map(String::as_str),
            Some("MyCustomHeaderValue")
        );
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_rate_limit() {
        let mut config = Config::defaults().unwrap();
        config.rate_limit.permit_limit = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRateLimit(_))));
    }

    #[test]
    fn test_https_metadata_required() {
        let mut config = Config::defaults().unwrap();
        config.auth.require_https_metadata = true;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAuth(_))));

        config.auth.authority = "https://id.example.com/realms/master".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cors_wildcard_with_credentials_rejected_outside_development() {
        let mut config = Config::defaults().unwrap();
        config.cors.allowed_origins = vec!["*".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCors(_))));

        config.environment = AppEnvironment::Development;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_blocked_ip() {
        let mut config = Config::defaults().unwrap();
        config.security.blocked_ips = vec!["not-an-ip".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSecurity(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::defaults().unwrap();
        config.logging.level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogging(_))));
    }
}
