//! Per-run bookkeeping for an export.
//!
//! Reports what happened to each channel so the CLI can summarise a run.

use std::path::PathBuf;

use super::models::Watermark;

/// How the writer touched a channel's export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist and was created with a header.
    Created,
    /// Records were appended to an existing file.
    Appended,
    /// The file existed and there was nothing new to append.
    Unchanged,
}

/// Final state of one channel in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Records were written (possibly zero).
    Exported {
        records: usize,
        skipped: usize,
        write: WriteOutcome,
        /// The run was cancelled while this channel was in progress.
        partial: bool,
    },
    /// The channel was abandoned; prior export content is untouched.
    Failed { reason: String },
}

/// Outcome of exporting a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    pub path: PathBuf,
    /// Watermark that bounded this run's fetch.
    pub watermark: Watermark,
    pub status: ChannelStatus,
}

impl ChannelReport {
    #[must_use]
    pub const fn records(&self) -> usize {
        match self.status {
            ChannelStatus::Exported { records, .. } => records,
            ChannelStatus::Failed { .. } => 0,
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, ChannelStatus::Failed { .. })
    }
}

/// Summary of a whole export run.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub channels: Vec<ChannelReport>,
    /// Channels never started because a stop was requested.
    pub not_started: usize,
    pub cancelled: bool,
}

impl ExportSummary {
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.channels.iter().map(ChannelReport::records).sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.channels.iter().filter(|r| r.is_failed()).count()
    }
}
