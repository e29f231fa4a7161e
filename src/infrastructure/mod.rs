//! Infrastructure layer - external adapters (Slack API, filesystem).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod atomic_file;
pub mod cache_files;
pub mod config;
pub mod credentials;
pub mod encoding;
pub mod export_writer;
pub mod slack_client;
pub mod watermark;

pub use cache_files::{read_channels, read_members, write_channels, write_members};
pub use config::{ensure_config_exists, load_config, resolve_config_path};
pub use credentials::load_credentials;
pub use encoding::ExportEncoding;
pub use export_writer::ExportWriter;
pub use slack_client::{ApiMethod, HttpTransport, Params, Transport};
pub use watermark::read_watermark;
