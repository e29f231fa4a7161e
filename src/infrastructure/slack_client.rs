//! Slack Web API transport.
//!
//! [`Transport`] is the seam between the export logic and the network: it
//! performs exactly one request and hands back the decoded JSON body. Retries,
//! the `ok` flag and pagination are handled by the application layer.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::domain::{AppError, Result};

use super::credentials::Credentials;

/// Slack Web API methods used by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    ConversationsHistory,
    ConversationsReplies,
    ConversationsList,
    ConversationsJoin,
    UsersList,
}

impl ApiMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConversationsHistory => "conversations.history",
            Self::ConversationsReplies => "conversations.replies",
            Self::ConversationsList => "conversations.list",
            Self::ConversationsJoin => "conversations.join",
            Self::UsersList => "users.list",
        }
    }

    /// Methods that change workspace state are sent as form POSTs.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::ConversationsJoin)
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters as sent on the wire.
pub type Params = [(String, String)];

/// Performs a single Slack API request.
pub trait Transport {
    /// Sends one request and decodes the JSON body.
    ///
    /// # Errors
    /// Returns [`AppError::Http`] for network failures, non-2xx statuses and
    /// undecodable bodies. The body's `ok` flag is not inspected.
    fn call(&self, method: ApiMethod, params: &Params) -> Result<Value>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, method: ApiMethod, params: &Params) -> Result<Value> {
        (**self).call(method, params)
    }
}

/// Blocking HTTP transport authenticated with a bot token.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpTransport {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialised.
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("slack-channel-export/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn method_url(&self, method: ApiMethod) -> String {
        format!("{}/{}", self.base_url, method.as_str())
    }
}

impl Transport for HttpTransport {
    fn call(&self, method: ApiMethod, params: &Params) -> Result<Value> {
        let url = self.method_url(method);
        tracing::trace!(%method, ?params, "Sending request");

        let request = if method.is_write() {
            self.client.post(&url).form(params)
        } else {
            self.client.get(&url).query(params)
        };

        let response = request
            .bearer_auth(self.credentials.token())
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| AppError::http(method.as_str(), e))?;

        response
            .json::<Value>()
            .map_err(|e| AppError::http(method.as_str(), e))
    }
}
