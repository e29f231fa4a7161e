//! Configuration file management.
//!
//! Handles locating, loading and creating TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "slack-export.toml";

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Slack Channel Export Configuration
# Auto-generated - edit as needed

[api]
# Slack Web API base URL
base_url = "https://slack.com/api"

# Attempts per request, and the linear backoff unit between them
retries = 3
backoff_ms = 1000

# Per-request timeout in seconds
timeout_secs = 30

# Page size for channel history
history_page_size = 1000

# Give up on a paginated request after this many pages
max_pages = 10000

[export]
# Directory for <channel>.csv files
dir = "."

# Encoding of export files (shift_jis, cp932, utf-8, ...)
encoding = "shift_jis"

# Write timestamps in UTC instead of local time
utc = false

# Pauses that keep the run under Slack's rate limits
channel_pause_secs = 10
thread_pause_ms = 500

# Log a progress line every N records
progress_every = 10

[paths]
credentials = "credential.csv"
members = "members.csv"
channels = "channel_list.csv"

# Creating this file stops the run after the current step
stop_file = "STOP"

[behavior]
# Only export channels the bot is a member of
only_joined = true

# Join a channel and retry once when history answers not_in_channel
auto_join = false

# Refetch cached lists on the next run
refresh_members = false
refresh_channels = false
"#;

/// Resolves which config file to use.
///
/// An explicit path wins; otherwise `./slack-export.toml`, then the user
/// config directory. Returns `None` when no file exists.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    [PathBuf::from(LOCAL_CONFIG_FILE), AppConfig::default_config_path()]
        .into_iter()
        .find(|p| p.exists())
}

/// Load configuration from the resolved file or fall back to defaults.
///
/// # Errors
/// Returns error if a file is found (or given) but cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading configuration");
            load_config_from_file(&path)
        }
        None => Ok(AppConfig::default()),
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Create a default configuration file if it doesn't exist.
///
/// Returns `true` when a file was written.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io("Failed to create default config", e))?;

    tracing::info!(path = %path.display(), "Created default configuration");

    Ok(true)
}
