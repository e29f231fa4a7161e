//! Domain models for Slack export data.
//!
//! These models represent the entities that flow from the Slack API into the
//! per-channel export files.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const MICROS_PER_SEC: i64 = 1_000_000;

/// Layouts of the timestamp column, with the UTC offset.
const DISPLAY_PARSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"];

/// Offset-less layouts found in files written by earlier releases.
const NAIVE_PARSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A Slack message timestamp, held as exact microseconds since the epoch.
///
/// Slack uses the `ts` string (`"1700000000.123456"`) both as the message
/// identifier and as its sort key within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * MICROS_PER_SEC)
    }

    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Parses a Slack `ts` string such as `"1700000000.123456"`.
    ///
    /// Digits past microsecond precision are ignored.
    #[must_use]
    pub fn parse_slack(value: &str) -> Option<Self> {
        let value = value.trim();
        let (secs, frac) = value.split_once('.').unwrap_or((value, ""));

        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let secs: i64 = secs.parse().ok()?;
        let mut micros: i64 = 0;
        for digit in frac.bytes().chain(std::iter::repeat(b'0')).take(6) {
            micros = micros * 10 + i64::from(digit - b'0');
        }

        secs.checked_mul(MICROS_PER_SEC)?.checked_add(micros).map(Self)
    }

    /// Formats as a Slack `ts` string, e.g. for the `oldest` parameter.
    #[must_use]
    pub fn to_slack(self) -> String {
        format!(
            "{}.{:06}",
            self.0.div_euclid(MICROS_PER_SEC),
            self.0.rem_euclid(MICROS_PER_SEC)
        )
    }

    /// Human-readable `YYYY-MM-DD HH:MM:SS[.ffffff]+HH:MM` in the given zone.
    ///
    /// The fraction is omitted when the timestamp falls on a whole second.
    /// The offset keeps the value unique when a local clock repeats an hour.
    #[must_use]
    pub fn to_display(self, zone: ExportZone) -> Option<String> {
        let secs = self.0.div_euclid(MICROS_PER_SEC);
        let micros = self.0.rem_euclid(MICROS_PER_SEC);
        let nanos = u32::try_from(micros * 1_000).ok()?;
        let utc = DateTime::<Utc>::from_timestamp(secs, nanos)?;

        let at: DateTime<FixedOffset> = match zone {
            ExportZone::Utc => utc.fixed_offset(),
            ExportZone::Local => utc.with_timezone(&Local).fixed_offset(),
        };

        let mut out = at.format("%Y-%m-%d %H:%M:%S").to_string();
        if micros != 0 {
            out.push_str(&format!(".{micros:06}"));
        }
        out.push_str(&at.format("%:z").to_string());
        Some(out)
    }

    /// Parses a timestamp previously produced by [`to_display`](Self::to_display).
    ///
    /// Values without an offset are read in `zone`. A repeated local hour
    /// resolves to its earlier instant, so a resumed export re-reads rather
    /// than skips that hour.
    #[must_use]
    pub fn parse_display(value: &str, zone: ExportZone) -> Option<Self> {
        let value = value.trim();
        if let Some(at) = DISPLAY_PARSE_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        {
            return Some(Self(at.timestamp_micros()));
        }

        let naive = NAIVE_PARSE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())?;

        let micros = match zone {
            ExportZone::Utc => naive.and_utc().timestamp_micros(),
            ExportZone::Local => match Local.from_local_datetime(&naive) {
                LocalResult::Single(at) => at.timestamp_micros(),
                LocalResult::Ambiguous(a, b) => a.timestamp_micros().min(b.timestamp_micros()),
                LocalResult::None => return None,
            },
        };
        Some(Self(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_slack())
    }
}

/// Time zone used for the human-readable timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportZone {
    /// The machine's local time zone.
    #[default]
    Local,
    /// Coordinated universal time.
    Utc,
}

/// Maximum timestamp already exported for a channel.
///
/// An empty watermark admits everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermark(Option<Timestamp>);

impl Watermark {
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub const fn at(ts: Timestamp) -> Self {
        Self(Some(ts))
    }

    #[must_use]
    pub const fn timestamp(self) -> Option<Timestamp> {
        self.0
    }

    /// Whether a record with this timestamp is new, i.e. strictly later.
    #[must_use]
    pub fn admits(self, ts: Timestamp) -> bool {
        self.0.is_none_or(|mark| ts > mark)
    }

    /// Raises the watermark to include `ts`.
    pub fn observe(&mut self, ts: Timestamp) {
        if self.admits(ts) {
            self.0 = Some(ts);
        }
    }
}

/// A Slack conversation to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Opaque Slack channel id.
    pub id: String,
    /// Human name, used as the export filename stem.
    pub name: String,
    /// Whether the bot is a member. Not persisted in the channel cache.
    #[serde(default)]
    pub is_member: bool,
}

impl Channel {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_member: true,
        }
    }

    /// File name for this channel's export, safe to join onto a directory.
    #[must_use]
    pub fn export_file_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        let stem = if stem.is_empty() || stem == "." || stem == ".." {
            self.id.clone()
        } else {
            stem
        };
        format!("{stem}.csv")
    }
}

/// A workspace member with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "userid")]
    pub id: String,
    #[serde(rename = "fullname")]
    pub name: String,
}

/// Lookup from user id to display name.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    names: HashMap<String, String>,
}

impl UserDirectory {
    #[must_use]
    pub fn from_members(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            names: members.into_iter().map(|m| (m.id, m.name)).collect(),
        }
    }

    /// Display name for `user_id`, falling back to the id itself.
    #[must_use]
    pub fn resolve<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.names.get(user_id).map_or(user_id, String::as_str)
    }
}

/// A message from channel history or a thread, reduced to what the export uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub ts: Timestamp,
    pub user: String,
    pub text: String,
    /// Present only on messages that root a thread.
    pub reply_count: Option<u64>,
}

impl Message {
    #[must_use]
    pub const fn is_thread_root(&self) -> bool {
        self.reply_count.is_some()
    }
}

/// One row of a channel export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    /// Message text, possibly carrying the `Re:` reply marker.
    pub text: String,
    /// Resolved author name.
    pub user: String,
    pub ts: Timestamp,
}

impl ExportRecord {
    /// Builds the record for a channel message or a thread reply.
    ///
    /// `reply_position` is the reply's index among the surviving replies of its
    /// thread; every position after the first carries the `Re:` marker.
    #[must_use]
    pub fn from_message(
        message: &Message,
        users: &UserDirectory,
        reply_position: Option<usize>,
    ) -> Self {
        let text = match reply_position {
            Some(pos) if pos > 0 => format!("{REPLY_MARKER}{}", message.text),
            _ => message.text.clone(),
        };

        Self {
            text,
            user: users.resolve(&message.user).to_string(),
            ts: message.ts,
        }
    }
}

/// Prefix marking a flattened thread reply.
pub const REPLY_MARKER: &str = "Re:";

/// Why a raw API item was not turned into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingTimestamp,
    InvalidTimestamp(String),
    MissingText,
    MissingUser,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTimestamp => write!(f, "missing ts"),
            Self::InvalidTimestamp(ts) => write!(f, "invalid ts {ts:?}"),
            Self::MissingText => write!(f, "missing text"),
            Self::MissingUser => write!(f, "missing user"),
        }
    }
}

/// Result of the per-record error boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Parsed(Message),
    Skipped(SkipReason),
}
