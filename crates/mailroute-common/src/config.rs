//! Configuration for Mailroute

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Secrets used for credential encryption and tracking hashes
    pub secrets: SecretsConfig,

    /// Fallback SMTP transport used when routing cannot resolve an account
    pub fallback_smtp: Option<FallbackSmtpConfig>,

    /// Data retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in Message-ID headers
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
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
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP port for the send and tracking endpoints
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Secrets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Secret the tracking hashes are keyed with
    pub tracking: String,

    /// Secret the credential vault key is derived from.
    ///
    /// May be absent; credential access then fails at first use while
    /// everything that does not touch stored credentials keeps working.
    pub credential_key: Option<String>,
}

/// Fallback SMTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Sender address used when the message has none
    pub from_email: String,

    #[serde(default)]
    pub from_name: Option<String>,

    #[serde(default = "default_starttls")]
    pub use_starttls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

/// Data retention configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Purge email logs older than this many days; unset keeps them forever
    pub email_log_days: Option<i64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info,mailroute=debug".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailroute/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [database]
            url = "postgres://localhost/mailroute"

            [secrets]
            tracking = "s3cr3t"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.secrets.credential_key, None);
        assert!(config.fallback_smtp.is_none());
        assert_eq!(config.retention.email_log_days, None);
    }

    #[test]
    fn test_parse_fallback_smtp() {
        let config: Config = toml::from_str(
            r#"
            [database]
            url = "postgres://localhost/mailroute"

            [secrets]
            tracking = "s3cr3t"
            credential_key = "k3y"

            [fallback_smtp]
            host = "smtp.example.com"
            from_email = "noreply@example.com"
            "#,
        )
        .unwrap();

        let smtp = config.fallback_smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_starttls);
    }
}
