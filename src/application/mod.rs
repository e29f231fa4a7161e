//! Application layer - use cases and orchestration.
//!
//! This layer contains the export logic: retrying fetches, pagination,
//! thread flattening and the per-channel driver.

pub mod directory;
pub mod exporter;
pub mod fetcher;
pub mod formatter;
pub mod pacing;
pub mod paginator;
pub mod parser;
pub mod threads;

#[cfg(test)]
pub mod testing;

pub use directory::{load_channel_list, load_members, load_user_directory};
pub use exporter::{ExportOptions, ExportService};
pub use fetcher::{Fetcher, RetryPolicy};
pub use formatter::{
    format_channel_report, format_channels_table, format_members_table, format_status_table,
    format_summary,
};
pub use pacing::BlockingPacer;
