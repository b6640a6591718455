//! Configuration loader
//!
//! `ConfigLoader` reads an optional `.env` file and then the process
//! environment. Every `from_env` constructor has a `from_lookup` twin that
//! takes the variable source as a closure, which is what the tests use.

use std::path::{Path, PathBuf};

use super::dto::{DatabaseConfig, LoggingConfig, NatsConfig, ReplicationConfig, ServiceConfigDto};
use super::error::{ConfigError, Result};
use super::validator::validate_service_config;

/// Configuration loader
///
/// # Example
///
/// ```ignore
/// use agora_shared::config::ConfigLoader;
///
/// let loader = ConfigLoader::new(Some(".env".into()));
/// let config = loader.load_service_config()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Optional path to .env file
    env_file_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    ///
    /// ```
    /// use agora_shared::config::ConfigLoader;
    ///
    /// let loader = ConfigLoader::new(None);
    /// let loader = ConfigLoader::new(Some(".env".into()));
    /// ```
    pub fn new(env_file_path: Option<PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load, build and validate the service configuration.
    pub fn load_service_config(&self) -> Result<ServiceConfigDto> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = ServiceConfigDto::from_env()?;
        validate_service_config(&config)?;

        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

// ============================================================================
// Implementation: from_env / from_lookup
// ============================================================================

impl ServiceConfigDto {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup)?,
            nats: NatsConfig::from_lookup(&lookup)?,
            replication: ReplicationConfig::from_lookup(&lookup)?,
            logging: LoggingConfig::from_lookup(&lookup)?,
        })
    }
}

impl DatabaseConfig {
    /// # Required Variables
    ///
    /// - `AGORA_DATABASE_URL`
    ///
    /// # Optional Variables
    ///
    /// - `AGORA_DB_POOL_SIZE`: Default 10
    /// - `AGORA_DB_MIN_IDLE`: Default 1
    /// - `AGORA_DB_CONNECT_TIMEOUT_SECS`: Default 30
    /// - `AGORA_TX_TIMEOUT_SECS`: Default unset
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: required_var(lookup, "AGORA_DATABASE_URL")?,
            pool_size: parse_optional_var(lookup, "AGORA_DB_POOL_SIZE", 10)?,
            min_idle: parse_optional_var(lookup, "AGORA_DB_MIN_IDLE", 1)?,
            connect_timeout_secs: parse_optional_var(lookup, "AGORA_DB_CONNECT_TIMEOUT_SECS", 30)?,
            transaction_timeout_secs: parse_maybe_var(lookup, "AGORA_TX_TIMEOUT_SECS")?,
        })
    }
}

impl NatsConfig {
    /// # Required Variables
    ///
    /// - `AGORA_NATS_URL`: comma separated list
    ///
    /// # Optional Variables
    ///
    /// - `AGORA_NATS_CLUSTER_ID`: Default "social-network"
    /// - `AGORA_NATS_CLIENT_ID`: Default "comments-api"
    /// - `AGORA_NATS_CONNECT_TIMEOUT_SECS`: Default 5
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let urls = required_var(lookup, "AGORA_NATS_URL")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            urls,
            cluster_id: lookup("AGORA_NATS_CLUSTER_ID")
                .unwrap_or_else(|| "social-network".to_string()),
            client_id: lookup("AGORA_NATS_CLIENT_ID").unwrap_or_else(|| "comments-api".to_string()),
            connect_timeout_secs: parse_optional_var(lookup, "AGORA_NATS_CONNECT_TIMEOUT_SECS", 5)?,
        })
    }
}

impl ReplicationConfig {
    /// # Optional Variables
    ///
    /// - `AGORA_QUEUE_GROUP`: Default "posts"
    /// - `AGORA_ACK_WAIT_SECS`: Default 60
    /// - `AGORA_MAX_DELIVER`: Default 5
    /// - `AGORA_DEAD_LETTER_SUBJECT`: Default "post-dead-letter"
    /// - `AGORA_EVENT_CODEC`: Default "bincode"
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            queue_group: lookup("AGORA_QUEUE_GROUP").unwrap_or(defaults.queue_group),
            ack_wait_secs: parse_optional_var(lookup, "AGORA_ACK_WAIT_SECS", defaults.ack_wait_secs)?,
            max_deliver: parse_optional_var(lookup, "AGORA_MAX_DELIVER", defaults.max_deliver)?,
            dead_letter_subject: lookup("AGORA_DEAD_LETTER_SUBJECT")
                .unwrap_or(defaults.dead_letter_subject),
            codec: lookup("AGORA_EVENT_CODEC")
                .map(|s| s.to_ascii_lowercase())
                .unwrap_or(defaults.codec),
        })
    }
}

impl LoggingConfig {
    /// # Optional Variables
    ///
    /// - `RUST_LOG`: Default "info"
    /// - `AGORA_LOG_JSON`: "1" enables JSON output
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            json: parse_bool_var(lookup, "AGORA_LOG_JSON")?,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn required_var<F>(lookup: &F, var: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            var: var.to_string(),
        })
}

/// Parse an optional variable; absent means `default`, malformed is an error.
fn parse_optional_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    Ok(parse_maybe_var(lookup, var)?.unwrap_or(default))
}

fn parse_maybe_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
    }
}

fn parse_bool_var<F>(lookup: &F, var: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: other.to_string(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("AGORA_DATABASE_URL", "postgres://localhost:5432/comments"),
        ("AGORA_NATS_URL", "nats://localhost:4222"),
    ];

    #[test]
    fn test_config_loader_new() {
        let loader = ConfigLoader::new(None);
        assert!(loader.env_file_path.is_none());

        let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
        assert!(loader.env_file_path.is_some());
    }

    #[test]
    fn test_missing_env_file_is_reported() {
        let loader = ConfigLoader::new(Some(PathBuf::from("/nonexistent/agora.env")));
        let err = loader.load_service_config().unwrap_err();
        assert!(matches!(err, ConfigError::EnvFileLoad { .. }));
    }

    #[test]
    fn test_defaults_applied() {
        let config = ServiceConfigDto::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.database.min_idle, 1);
        assert_eq!(config.database.transaction_timeout_secs, None);
        assert_eq!(config.nats.urls, vec!["nats://localhost:4222".to_string()]);
        assert_eq!(config.nats.cluster_id, "social-network");
        assert_eq!(config.nats.client_id, "comments-api");
        assert_eq!(config.replication.queue_group, "posts");
        assert_eq!(config.replication.ack_wait_secs, 60);
        assert_eq!(config.replication.max_deliver, 5);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_missing_database_url() {
        let err =
            ServiceConfigDto::from_lookup(lookup_from(&[("AGORA_NATS_URL", "nats://x:4222")]))
                .unwrap_err();
        match err {
            ConfigError::MissingRequired { var } => assert_eq!(var, "AGORA_DATABASE_URL"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides_and_url_list() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AGORA_NATS_URL", "nats://a:4222, nats://b:4222"));
        pairs.push(("AGORA_ACK_WAIT_SECS", "5"));
        pairs.push(("AGORA_TX_TIMEOUT_SECS", "3"));
        pairs.push(("AGORA_EVENT_CODEC", "JSON"));
        pairs.push(("AGORA_LOG_JSON", "1"));

        let config = ServiceConfigDto::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.nats.urls.len(), 2);
        assert_eq!(config.nats.urls[1], "nats://b:4222");
        assert_eq!(config.replication.ack_wait_secs, 5);
        assert_eq!(config.database.transaction_timeout_secs, Some(3));
        assert_eq!(config.replication.codec, "json");
        assert!(config.logging.json);
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AGORA_MAX_DELIVER", "many"));

        let err = ServiceConfigDto::from_lookup(lookup_from(&pairs)).unwrap_err();
        match err {
            ConfigError::InvalidValue { var, value } => {
                assert_eq!(var, "AGORA_MAX_DELIVER");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
