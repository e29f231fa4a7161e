//! Parsing of Slack API payload items.
//!
//! Every field is optional on the wire. Items that lack what the export needs
//! are reported through [`RecordOutcome::Skipped`] instead of failing the page.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{Channel, Member, Message, RecordOutcome, SkipReason, Timestamp};

/// Message as returned by `conversations.history` and `conversations.replies`.
#[derive(Debug, Deserialize, Default)]
pub struct RawMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reply_count: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawUser {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: RawProfile,
}

#[derive(Debug, Deserialize, Default)]
struct RawProfile {
    #[serde(default)]
    real_name_normalized: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    display_name_normalized: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawChannel {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_member: bool,
}

/// Deserializes the array under `key`, one item at a time.
///
/// Items of the wrong shape are dropped with a debug log.
pub fn page_items<I: DeserializeOwned>(page: &Value, key: &str) -> Vec<I> {
    let Some(items) = page.get(key).and_then(Value::as_array) else {
        tracing::debug!(key, "Page has no item array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match I::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(key, error = %e, "Skipping malformed item");
                None
            }
        })
        .collect()
}

/// Converts a raw message into a [`Message`] or a skip reason.
///
/// Messages posted by integrations carry `bot_id` instead of `user`.
#[must_use]
pub fn parse_message(raw: &RawMessage) -> RecordOutcome {
    let Some(ts_raw) = raw.ts.as_deref() else {
        return RecordOutcome::Skipped(SkipReason::MissingTimestamp);
    };
    let Some(ts) = Timestamp::parse_slack(ts_raw) else {
        return RecordOutcome::Skipped(SkipReason::InvalidTimestamp(ts_raw.to_string()));
    };
    let Some(text) = raw.text.clone() else {
        return RecordOutcome::Skipped(SkipReason::MissingText);
    };
    let Some(user) = non_empty(raw.user.as_deref()).or_else(|| non_empty(raw.bot_id.as_deref()))
    else {
        return RecordOutcome::Skipped(SkipReason::MissingUser);
    };

    RecordOutcome::Parsed(Message {
        ts,
        user: user.to_string(),
        text,
        reply_count: raw.reply_count,
    })
}

/// Converts a `users.list` entry into a [`Member`].
///
/// Deleted accounts, bots and entries without an id yield `None`. The name is
/// the first non-empty of the normalized real name, real name, normalized
/// display name, display name and handle.
#[must_use]
pub fn parse_member(raw: &RawUser) -> Option<Member> {
    if raw.deleted || raw.is_bot {
        return None;
    }
    let id = non_empty(raw.id.as_deref())?;

    let profile = &raw.profile;
    let name = [
        profile.real_name_normalized.as_deref(),
        profile.real_name.as_deref(),
        profile.display_name_normalized.as_deref(),
        profile.display_name.as_deref(),
        raw.name.as_deref(),
    ]
    .into_iter()
    .find_map(non_empty)
    .unwrap_or(id);

    Some(Member {
        id: id.to_string(),
        name: name.to_string(),
    })
}

/// Converts a `conversations.list` entry into a [`Channel`].
#[must_use]
pub fn parse_channel(raw: &RawChannel) -> Option<Channel> {
    let id = non_empty(raw.id.as_deref())?;
    let name = non_empty(raw.name.as_deref()).unwrap_or(id);

    Some(Channel {
        id: id.to_string(),
        name: name.to_string(),
        is_member: raw.is_member,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
