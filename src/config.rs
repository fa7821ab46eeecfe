use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated. Unset allows any origin.
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the documents
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,

    /// Document a bare `/ws` connection is subscribed to on connect
    pub default_document: Option<String>,

    /// Quiet period before an external file change is broadcast
    #[serde(default = "default_external_debounce_ms")]
    pub external_debounce_ms: u64,

    /// Poll interval of the files directory watcher, 0 disables it
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Sessions without subscribers are dropped after this long
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Per-document broadcast channel capacity
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Refuse submissions whose base version is not the current version
    #[serde(default)]
    pub reject_stale_versions: bool,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        Ok(envy::from_env::<Config>()?)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn external_debounce(&self) -> Duration {
        Duration::from_millis(self.external_debounce_ms)
    }

    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch_interval_ms > 0).then(|| Duration::from_millis(self.watch_interval_ms))
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Allowed CORS origins, `None` meaning any.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        self.cors_origins.as_ref().map(|origins| {
            origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            files_dir: default_files_dir(),
            default_document: None,
            external_debounce_ms: default_external_debounce_ms(),
            watch_interval_ms: default_watch_interval_ms(),
            session_idle_secs: default_session_idle_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            reject_stale_versions: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_external_debounce_ms() -> u64 {
    200
}

fn default_watch_interval_ms() -> u64 {
    1000
}

fn default_session_idle_secs() -> u64 {
    300
}

fn default_broadcast_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envy_fills_defaults_and_parses_overrides() {
        let vars = vec![
            ("PORT".to_string(), "4100".to_string()),
            ("DEFAULT_DOCUMENT".to_string(), "example.md".to_string()),
            ("WATCH_INTERVAL_MS".to_string(), "0".to_string()),
            ("REJECT_STALE_VERSIONS".to_string(), "true".to_string()),
            ("CORS_ORIGINS".to_string(), "http://a.test, http://b.test,".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert_eq!(config.port, 4100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.default_document.as_deref(), Some("example.md"));
        assert_eq!(config.watch_interval(), None);
        assert!(config.reject_stale_versions);
        assert_eq!(config.external_debounce(), Duration::from_millis(200));
        assert_eq!(
            config.cors_origin_list(),
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn default_matches_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        let default = Config::default();
        assert_eq!(config.port, default.port);
        assert_eq!(config.files_dir, default.files_dir);
        assert_eq!(config.session_idle_secs, default.session_idle_secs);
        assert!(config.is_development());
    }
}
