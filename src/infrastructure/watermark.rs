//! Watermark discovery from existing export files.
//!
//! A corrupt or unreadable export file never blocks a run: every failure
//! here degrades to "no watermark" or to skipping the offending row.

use std::io::ErrorKind;
use std::path::Path;

use crate::domain::{ExportZone, Timestamp, Watermark};

use super::encoding::ExportEncoding;
use super::export_writer::TS_COLUMN;

/// Derives the watermark of a channel's export file.
///
/// Returns [`Watermark::none`] when the file is missing, unreadable, or has
/// no row with a parsable timestamp. Rows that are short or carry an
/// unparsable timestamp are skipped.
#[must_use]
pub fn read_watermark(path: &Path, encoding: ExportEncoding, zone: ExportZone) -> Watermark {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Watermark::none(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Export file unreadable, exporting everything");
            return Watermark::none();
        }
    };

    let text = encoding.decode(&bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut mark = Watermark::none();
    let mut parsed = 0usize;
    let mut skipped = 0usize;

    for row in reader.records() {
        let ts = row
            .ok()
            .and_then(|r| r.get(TS_COLUMN).and_then(|v| Timestamp::parse_display(v, zone)));

        match ts {
            Some(ts) => {
                mark.observe(ts);
                parsed += 1;
            }
            None => skipped += 1,
        }
    }

    tracing::debug!(
        path = %path.display(),
        parsed,
        skipped,
        watermark = ?mark.timestamp(),
        "Read export watermark"
    );

    mark
}
