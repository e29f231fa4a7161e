//! Domain layer - core types for the export.
//!
//! This layer contains domain models, configuration, the cancellation
//! token and error types, without any network or file access of its own.

pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod sync;

pub use cancel::CancellationToken;
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use models::{
    Channel, ExportRecord, ExportZone, Member, Message, RecordOutcome, SkipReason, Timestamp,
    UserDirectory, Watermark,
};
pub use sync::{ChannelReport, ChannelStatus, ExportSummary, WriteOutcome};
