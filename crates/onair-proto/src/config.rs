use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Upstream feeds and the stream itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Base of the Liquidsoap control API (`/status`, `/library`, `/skip`, `/next`).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Icecast HTML status page.
    #[serde(default = "default_icecast_status_url")]
    pub icecast_status_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Exact heading text of the mount section we track on the status page.
    #[serde(default = "default_mount_heading")]
    pub mount_heading: String,
}

impl EndpointsConfig {
    /// `api_base` joined with `path`, tolerating a trailing slash on the base.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// When false the client runs feeds and the API without an audio transport.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_delay_cap_ms")]
    pub delay_cap_ms: u64,
    /// Start muted and unmute once playback is confirmed.
    #[serde(default = "default_true")]
    pub autoplay_muted: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// How many matches the API hands to the search box.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            icecast_status_url: default_icecast_status_url(),
            stream_url: default_stream_url(),
            mount_heading: default_mount_heading(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            delay_cap_ms: default_delay_cap_ms(),
            autoplay_muted: default_true(),
            volume: default_volume(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
        }
    }
}

fn default_api_base() -> String {
    "https://lidyi.com/config".to_string()
}

fn default_icecast_status_url() -> String {
    "https://lidyi.com/radio/status.xsl".to_string()
}

fn default_stream_url() -> String {
    "https://lidyi.com/radio/stream.mp3".to_string()
}

fn default_mount_heading() -> String {
    "Mount Point /stream.mp3".to_string()
}

fn default_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    3000
}

fn default_delay_cap_ms() -> u64 {
    15000
}

fn default_volume() -> f32 {
    0.8
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_display_limit() -> usize {
    20
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
