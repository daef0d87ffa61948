use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("POLLS_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("POLLS_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Config) -> Result<Self> {
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        ensure!(
            !self.database.url.trim().is_empty(),
            "Database URL must be specified"
        );
        ensure!(self.server.port > 0, "Server port must be greater than zero");
        ensure!(
            self.database.max_connections >= self.database.min_connections.unwrap_or(1),
            "Max connections must be >= min connections"
        );
        ensure!(
            self.database.max_connections <= 128,
            "Connection pool oversized"
        );
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

/// Bounds for the per-question results cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_results_max_capacity")]
    pub results_max_capacity: u64,
    #[serde(default = "CacheConfig::default_results_ttl_seconds")]
    pub results_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn results_ttl(&self) -> Duration {
        Duration::from_secs(self.results_ttl_seconds)
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            self.results_max_capacity >= 10,
            "Results cache capacity must be at least 10"
        );
        ensure!(
            self.results_ttl_seconds > 0,
            "Results cache TTL must be positive"
        );
        ensure!(
            self.results_ttl_seconds <= 86_400,
            "Results cache TTL cannot exceed one day"
        );
        Ok(())
    }

    const fn default_results_max_capacity() -> u64 {
        1_000
    }

    const fn default_results_ttl_seconds() -> u64 {
        30
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            results_max_capacity: Self::default_results_max_capacity(),
            results_ttl_seconds: Self::default_results_ttl_seconds(),
        }
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
