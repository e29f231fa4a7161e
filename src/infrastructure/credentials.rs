//! Bot token loading from a headered CSV credential file.
//!
//! Supported layouts, tried in order:
//! 1. a `SLACK_BOT_TOKEN` column (first non-empty value)
//! 2. a `token` column (first non-empty value)
//! 3. `key,value` rows where `key` is `SLACK_BOT_TOKEN` or `token`

use std::fmt;
use std::path::Path;

use crate::domain::{AppError, Result};

const TOKEN_KEYS: [&str; 2] = ["SLACK_BOT_TOKEN", "token"];

/// A Slack bearer token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wraps a token string.
    ///
    /// # Errors
    /// Returns a configuration error for an empty token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AppError::Config {
                message: "Slack token is empty".into(),
            });
        }
        Ok(Self { token })
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.token.chars().take(5).collect();
        write!(f, "Credentials({visible}…)")
    }
}

/// Loads the bot token from the credential file at `path`.
///
/// # Errors
/// Returns a configuration error if the file is missing, has no header, or
/// yields no token through any supported layout.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    if !path.exists() {
        return Err(AppError::Config {
            message: format!(
                "Credential file not found: {}. Create it with a SLACK_BOT_TOKEN column.",
                path.display()
            ),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::csv(format!("Failed to open {}", path.display()), e))?;

    let headers = reader
        .headers()
        .map_err(|e| AppError::csv("Failed to read credential header", e))?
        .clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(AppError::Config {
            message: format!("Credential file has no header row: {}", path.display()),
        });
    }

    let rows: Vec<csv::StringRecord> = reader.records().filter_map(std::result::Result::ok).collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    for name in TOKEN_KEYS {
        if let Some(idx) = column(name) {
            let token = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .find(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config {
                    message: format!("Credential column {name} is empty"),
                })?;
            return Credentials::new(token);
        }
    }

    if let (Some(key_idx), Some(value_idx)) = (column("key"), column("value")) {
        let token = rows
            .iter()
            .filter(|row| row.get(key_idx).is_some_and(|k| TOKEN_KEYS.contains(&k)))
            .filter_map(|row| row.get(value_idx))
            .find(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config {
                message: "Credential file has no SLACK_BOT_TOKEN or token key".into(),
            })?;
        return Credentials::new(token);
    }

    Err(AppError::Config {
        message: "Unsupported credential file layout. Use a SLACK_BOT_TOKEN column, a token column, or key,value rows".into(),
    })
}
