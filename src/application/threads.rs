//! Flattening of threads into export rows.

use std::time::Duration;

use crate::domain::{ExportRecord, RecordOutcome, Result, Timestamp, UserDirectory, Watermark};
use crate::infrastructure::{ApiMethod, Transport};

use super::fetcher::Fetcher;
use super::pacing::Pacer;
use super::paginator::{paginate, PageRequest};
use super::parser::{page_items, parse_message, RawMessage};

/// Rows produced from one thread.
#[derive(Debug, Default)]
pub struct FlattenedThread {
    pub records: Vec<ExportRecord>,
    pub skipped: usize,
}

/// Thread-walking settings shared by every thread of a run.
#[derive(Debug, Clone, Copy)]
pub struct ThreadOptions {
    pub max_pages: usize,
    /// Pause after each thread to stay under the replies rate limit.
    pub pause: Duration,
}

/// Fetches all replies of the thread rooted at `root` and turns the ones
/// newer than `watermark` into rows.
///
/// The replies endpoint returns the root first. Among the replies that pass
/// the watermark, every one after the first gets the reply marker, so the
/// root keeps its plain text when it is itself new.
///
/// # Errors
/// Returns the fetch error for the replies request. A stop request yields
/// whatever replies were fetched.
pub fn flatten_thread<T: Transport, P: Pacer>(
    fetcher: &Fetcher<T, P>,
    channel_id: &str,
    root: Timestamp,
    watermark: Watermark,
    users: &UserDirectory,
    options: ThreadOptions,
) -> Result<FlattenedThread> {
    let request = PageRequest::new(ApiMethod::ConversationsReplies)
        .param("channel", channel_id)
        .param("ts", root.to_slack());

    let replies = paginate(fetcher, &request, options.max_pages, |page| {
        page_items::<RawMessage>(page, "messages")
    })?;

    let mut thread = FlattenedThread::default();
    let mut position = 0;

    for raw in &replies {
        let message = match parse_message(raw) {
            RecordOutcome::Parsed(message) => message,
            RecordOutcome::Skipped(reason) => {
                tracing::debug!(channel_id, thread = %root, %reason, "Skipping reply");
                thread.skipped += 1;
                continue;
            }
        };

        if !watermark.admits(message.ts) {
            continue;
        }

        thread
            .records
            .push(ExportRecord::from_message(&message, users, Some(position)));
        position += 1;
    }

    tracing::debug!(
        channel_id,
        thread = %root,
        replies = replies.len(),
        new = thread.records.len(),
        "Thread flattened"
    );

    if !fetcher.cancel_token().is_cancelled() {
        fetcher.pacer().pause(options.pause);
    }

    Ok(thread)
}
