use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;
use super::protocol::StreamFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Acceptable stream encodings, most preferred first.
    #[serde(default = "default_formats")]
    pub formats: Vec<StreamFormat>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Read-ahead buffer for live streams, in seconds.
    #[serde(default = "default_cache_secs")]
    pub cache_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl MetadataConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Where the station list comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Local TOML station file.  The built-in list is used when it is missing.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            volume: default_volume(),
            cache_secs: default_cache_secs(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_formats() -> Vec<StreamFormat> {
    vec![StreamFormat::Mp3, StreamFormat::Aac]
}

fn default_volume() -> f32 {
    0.8
}

fn default_cache_secs() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    8
}

fn default_user_agent() -> String {
    format!("tuner/{}", env!("CARGO_PKG_VERSION"))
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

impl Config {
    /// Load from the default location, writing the defaults there on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(
            config.player.formats,
            vec![StreamFormat::Mp3, StreamFormat::Aac]
        );
        assert_eq!(config.metadata.poll_interval(), Duration::from_secs(10));
        assert!(config.stations.stations_toml.ends_with("tuner/stations.toml"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [player]
            formats = ["aac"]

            [metadata]
            poll_interval_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.player.formats, vec![StreamFormat::Aac]);
        assert_eq!(config.player.cache_secs, 10);
        assert_eq!(config.metadata.poll_interval_secs, 30);
        assert_eq!(config.metadata.request_timeout_secs, 8);
        assert_eq!(config.http.port, 8990);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let metadata = MetadataConfig {
            poll_interval_secs: 0,
            request_timeout_secs: 0,
            ..MetadataConfig::default()
        };
        assert_eq!(metadata.poll_interval(), Duration::from_secs(1));
        assert_eq!(metadata.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let first = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut edited = first.clone();
        edited.http.port = 9001;
        edited.save_to(&path).unwrap();

        let second = Config::load_from(&path).unwrap();
        assert_eq!(second.http.port, 9001);
        assert_eq!(second.player.formats, first.player.formats);
    }
}
