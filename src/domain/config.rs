//! Application configuration.
//!
//! Every value has a default, so an empty or missing config file is valid.
//! Environment toggles are applied on top of the file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::models::{Channel, ExportZone};

/// Slack Web API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL that method names are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Attempts per request (first try included).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Linear backoff unit in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `limit` parameter for conversations.history.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Ceiling on pages fetched for a single paginated request.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            history_page_size: default_history_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_base_url() -> String {
    "https://slack.com/api".to_string()
}

const fn default_retries() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_history_page_size() -> u32 {
    1000
}

const fn default_max_pages() -> usize {
    10_000
}

/// Export file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory holding the per-channel CSV files.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,

    /// WHATWG encoding label for export files.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Write timestamps in UTC instead of local time.
    #[serde(default)]
    pub utc: bool,

    /// Pause between channels in seconds.
    #[serde(default = "default_channel_pause_secs")]
    pub channel_pause_secs: u64,

    /// Pause after each thread in milliseconds.
    #[serde(default = "default_thread_pause_ms")]
    pub thread_pause_ms: u64,

    /// Log a progress line every N records.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            encoding: default_encoding(),
            utc: false,
            channel_pause_secs: default_channel_pause_secs(),
            thread_pause_ms: default_thread_pause_ms(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_encoding() -> String {
    "shift_jis".to_string()
}

const fn default_channel_pause_secs() -> u64 {
    10
}

const fn default_thread_pause_ms() -> u64 {
    500
}

const fn default_progress_every() -> usize {
    10
}

/// Locations of side files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_credentials")]
    pub credentials: PathBuf,

    #[serde(default = "default_members")]
    pub members: PathBuf,

    #[serde(default = "default_channels")]
    pub channels: PathBuf,

    /// Creating this file requests a graceful stop.
    #[serde(default = "default_stop_file")]
    pub stop_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            credentials: default_credentials(),
            members: default_members(),
            channels: default_channels(),
            stop_file: default_stop_file(),
        }
    }
}

fn default_credentials() -> PathBuf {
    PathBuf::from("credential.csv")
}

fn default_members() -> PathBuf {
    PathBuf::from("members.csv")
}

fn default_channels() -> PathBuf {
    PathBuf::from("channel_list.csv")
}

fn default_stop_file() -> PathBuf {
    PathBuf::from("STOP")
}

/// Run-time switches, also settable through environment toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Keep only channels the bot has joined when building the channel list.
    #[serde(default = "default_only_joined")]
    pub only_joined: bool,

    /// Join a channel once when history answers `not_in_channel`.
    #[serde(default)]
    pub auto_join: bool,

    /// Refetch the member list even if the cache exists.
    #[serde(default)]
    pub refresh_members: bool,

    /// Refetch the channel list even if the cache exists.
    #[serde(default)]
    pub refresh_channels: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            only_joined: default_only_joined(),
            auto_join: false,
            refresh_members: false,
            refresh_channels: false,
        }
    }
}

const fn default_only_joined() -> bool {
    true
}

/// Environment variable that overrides the credential file location.
pub const ENV_CREDENTIALS: &str = "SLACK_CREDENTIAL_CSV";
/// Environment variable that requests a graceful stop when set to `1`.
pub const ENV_STOP: &str = "STOP_NOW";

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub behavior: BehaviorConfig,
}

impl AppConfig {
    /// Applies environment toggles on top of the loaded configuration.
    ///
    /// Boolean toggles accept `1` for on and `0` for off; other values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_CREDENTIALS).filter(|p| !p.trim().is_empty()) {
            self.paths.credentials = PathBuf::from(path);
        }

        let toggle = |name: &str| match lookup(name).as_deref().map(str::trim) {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        };

        if let Some(on) = toggle("REFRESH_MEMBERS") {
            self.behavior.refresh_members = on;
        }
        if let Some(on) = toggle("REFRESH_CHANNELS") {
            self.behavior.refresh_channels = on;
        }
        if let Some(on) = toggle("ONLY_JOINED") {
            if on {
                self.behavior.only_joined = true;
            } else {
                self.include_unjoined_channels();
            }
        }
        if let Some(on) = toggle("AUTO_JOIN") {
            self.behavior.auto_join = on;
        }
    }

    /// Lists every visible channel instead of joined ones only.
    ///
    /// The channel cache holds only the filtered list, so it is refetched.
    pub fn include_unjoined_channels(&mut self) {
        self.behavior.only_joined = false;
        self.behavior.refresh_channels = true;
    }

    /// Path of the export file for a channel.
    #[must_use]
    pub fn channel_export_path(&self, channel: &Channel) -> PathBuf {
        self.export.dir.join(channel.export_file_name())
    }

    #[must_use]
    pub const fn export_zone(&self) -> ExportZone {
        if self.export.utc {
            ExportZone::Utc
        } else {
            ExportZone::Local
        }
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.api.backoff_ms)
    }

    #[must_use]
    pub const fn channel_pause(&self) -> Duration {
        Duration::from_secs(self.export.channel_pause_secs)
    }

    #[must_use]
    pub const fn thread_pause(&self) -> Duration {
        Duration::from_millis(self.export.thread_pause_ms)
    }

    /// Default location of the user-level config file.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slack-export")
            .join("config.toml")
    }
}
