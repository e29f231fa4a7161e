//! Per-channel CSV export writer.
//!
//! Two write paths: a missing file is created with a header, an existing one
//! gets the new records appended after its current bytes. Both go through
//! [`write_atomic`](super::atomic_file::write_atomic).
//!
//! The writer does not deduplicate. Rows stay unique only because callers
//! pass records already filtered against the file's watermark.

use std::path::Path;

use crate::domain::{AppError, ExportRecord, ExportZone, Result, WriteOutcome};

use super::atomic_file::write_atomic;
use super::encoding::ExportEncoding;

/// Header row written when an export file is created.
pub const EXPORT_HEADER: [&str; 3] = ["text", "user", "ts"];

/// Index of the timestamp column.
pub const TS_COLUMN: usize = 2;

/// Writes export records in the configured encoding and time zone.
#[derive(Debug, Clone, Copy)]
pub struct ExportWriter {
    encoding: ExportEncoding,
    zone: ExportZone,
}

impl ExportWriter {
    #[must_use]
    pub const fn new(encoding: ExportEncoding, zone: ExportZone) -> Self {
        Self { encoding, zone }
    }

    /// Creates or appends to the export file at `path`.
    ///
    /// Appending nothing to an existing file leaves it untouched. A missing
    /// file is always created, even when there are no records.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or written.
    pub fn write(&self, path: &Path, records: &[ExportRecord]) -> Result<WriteOutcome> {
        if path.exists() {
            if records.is_empty() {
                return Ok(WriteOutcome::Unchanged);
            }

            let mut content = std::fs::read(path)
                .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
            if !content.is_empty() && !content.ends_with(b"\n") {
                content.extend_from_slice(b"\r\n");
            }
            content.extend(self.encode_rows(records, false)?);

            write_atomic(path, &content)?;
            tracing::debug!(path = %path.display(), records = records.len(), "Appended records");
            Ok(WriteOutcome::Appended)
        } else {
            let content = self.encode_rows(records, true)?;
            write_atomic(path, &content)?;
            tracing::debug!(path = %path.display(), records = records.len(), "Created export file");
            Ok(WriteOutcome::Created)
        }
    }

    /// Serialises rows to CSV, then encodes them for disk.
    fn encode_rows(&self, records: &[ExportRecord], header: bool) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());

        if header {
            writer
                .write_record(EXPORT_HEADER)
                .map_err(|e| AppError::csv("Failed to write header", e))?;
        }

        for record in records {
            let ts = record
                .ts
                .to_display(self.zone)
                .unwrap_or_else(|| record.ts.to_slack());
            writer
                .write_record([record.text.as_str(), record.user.as_str(), ts.as_str()])
                .map_err(|e| AppError::csv("Failed to write record", e))?;
        }

        let utf8 = writer.into_inner().map_err(|e| AppError::InvalidData {
            message: format!("Failed to flush CSV buffer: {e}"),
        })?;
        let utf8 = String::from_utf8(utf8).map_err(|e| AppError::InvalidData {
            message: format!("CSV buffer is not UTF-8: {e}"),
        })?;

        Ok(self.encoding.encode_lossy(&utf8))
    }
}
