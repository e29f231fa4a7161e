//! Member and channel cache files.
//!
//! Both caches are UTF-8 CSV files that are fully rewritten on refresh:
//! - `members.csv`: `userid,fullname`
//! - `channel_list.csv`: `channel_name,channel_id`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{AppError, Channel, Member, Result};

use super::atomic_file::write_atomic;

const MEMBER_HEADER: [&str; 2] = ["userid", "fullname"];
const CHANNEL_HEADER: [&str; 2] = ["channel_name", "channel_id"];

/// Row layout of the channel cache.
#[derive(Debug, Serialize, Deserialize)]
struct ChannelRow {
    channel_name: String,
    channel_id: String,
}

/// Writes the member cache.
///
/// # Errors
/// Returns error if the file cannot be written.
pub fn write_members(path: &Path, members: &[Member]) -> Result<()> {
    let rows = members.iter().map(|m| [m.id.as_str(), m.name.as_str()]);
    write_table(path, MEMBER_HEADER, rows)?;
    tracing::info!(path = %path.display(), members = members.len(), "Member cache written");
    Ok(())
}

/// Reads the member cache. Malformed rows are skipped.
///
/// # Errors
/// Returns error if the file cannot be opened.
pub fn read_members(path: &Path) -> Result<Vec<Member>> {
    let mut reader = open_reader(path)?;
    let members: Vec<Member> = reader
        .deserialize::<Member>()
        .filter_map(|row| {
            row.map_err(|e| tracing::debug!("Skipping member row: {}", e))
                .ok()
        })
        .filter(|m| !m.id.is_empty())
        .collect();

    tracing::debug!(path = %path.display(), members = members.len(), "Loaded member cache");
    Ok(members)
}

/// Writes the channel cache.
///
/// # Errors
/// Returns error if the file cannot be written.
pub fn write_channels(path: &Path, channels: &[Channel]) -> Result<()> {
    let rows = channels.iter().map(|c| [c.name.as_str(), c.id.as_str()]);
    write_table(path, CHANNEL_HEADER, rows)?;
    tracing::info!(path = %path.display(), channels = channels.len(), "Channel cache written");
    Ok(())
}

/// Reads the channel cache. Malformed rows are skipped.
///
/// # Errors
/// Returns error if the file cannot be opened.
pub fn read_channels(path: &Path) -> Result<Vec<Channel>> {
    let mut reader = open_reader(path)?;
    let channels: Vec<Channel> = reader
        .deserialize::<ChannelRow>()
        .filter_map(|row| {
            row.map_err(|e| tracing::debug!("Skipping channel row: {}", e))
                .ok()
        })
        .filter(|row| !row.channel_id.is_empty())
        .map(|row| Channel::new(row.channel_id, row.channel_name))
        .collect();

    tracing::debug!(path = %path.display(), channels = channels.len(), "Loaded channel cache");
    Ok(channels)
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::csv(format!("Failed to open {}", path.display()), e))
}

fn write_table<'a>(
    path: &Path,
    header: [&str; 2],
    rows: impl Iterator<Item = [&'a str; 2]>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer
        .write_record(header)
        .map_err(|e| AppError::csv("Failed to write header", e))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| AppError::csv("Failed to write row", e))?;
    }

    let bytes = writer.into_inner().map_err(|e| AppError::InvalidData {
        message: format!("Failed to flush CSV buffer: {e}"),
    })?;

    write_atomic(path, &bytes)
}
