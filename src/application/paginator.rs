//! Cursor pagination over Slack list endpoints.

use serde_json::Value;

use crate::domain::{AppError, Result};
use crate::infrastructure::{ApiMethod, Transport};

use super::fetcher::Fetcher;
use super::pacing::Pacer;

/// A paginated request: method plus the parameters sent on every page.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: ApiMethod,
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    #[must_use]
    pub const fn new(method: ApiMethod) -> Self {
        Self {
            method,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// Follows `response_metadata.next_cursor` until it comes back empty.
///
/// `extract` pulls the items out of each page. If a stop is requested the
/// items gathered so far are returned.
///
/// # Errors
/// Returns the first non-cancellation fetch error, or
/// [`AppError::PageLimitExceeded`] after `max_pages` pages that all carried a
/// cursor.
pub fn paginate<T, P, I>(
    fetcher: &Fetcher<T, P>,
    request: &PageRequest,
    max_pages: usize,
    mut extract: impl FnMut(&Value) -> Vec<I>,
) -> Result<Vec<I>>
where
    T: Transport,
    P: Pacer,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 1..=max_pages.max(1) {
        if fetcher.cancel_token().is_cancelled() {
            tracing::info!(method = %request.method, page, "Stop requested, ending pagination");
            return Ok(items);
        }

        let mut params = request.params.clone();
        if let Some(cursor) = &cursor {
            params.push(("cursor".to_string(), cursor.clone()));
        }

        let body = match fetcher.fetch(request.method, &params) {
            Ok(body) => body,
            Err(e) if e.is_cancelled() => return Ok(items),
            Err(e) => return Err(e),
        };

        items.extend(extract(&body));
        cursor = next_cursor(&body);

        if cursor.is_none() {
            tracing::debug!(method = %request.method, pages = page, items = items.len(), "Pagination complete");
            return Ok(items);
        }
    }

    Err(AppError::PageLimitExceeded {
        method: request.method.as_str().to_string(),
        max_pages,
    })
}

fn next_cursor(body: &Value) -> Option<String> {
    body.pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
