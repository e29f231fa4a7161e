//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Slack Channel Export - incrementally export channel history to CSV.
///
/// Each run appends only messages newer than the last exported one.
/// Create a `STOP` file or set `STOP_NOW=1` to stop after the current step.
#[derive(Parser, Debug)]
#[command(name = "slack-channel-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file (default: ./slack-export.toml, then the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export new messages of every cached channel (or the named ones).
    Export {
        /// Channel name or id to export; repeatable.
        #[arg(short, long = "channel")]
        channels: Vec<String>,

        /// Join channels the bot is not a member of.
        #[arg(long)]
        auto_join: bool,

        /// Refetch the member list before exporting.
        #[arg(long)]
        refresh_members: bool,

        /// Refetch the channel list before exporting.
        #[arg(long)]
        refresh_channels: bool,

        /// Include channels the bot has not joined (refetches the channel list).
        #[arg(long)]
        all_channels: bool,
    },

    /// List channels from the cache, fetching it when missing.
    Channels {
        /// Refetch the channel list.
        #[arg(long)]
        refresh: bool,
    },

    /// List workspace members from the cache, fetching it when missing.
    Members {
        /// Refetch the member list.
        #[arg(long)]
        refresh: bool,
    },

    /// Show the last exported message time of each cached channel.
    Status,

    /// Show the effective configuration.
    Config {
        /// Write a default config file if none exists.
        #[arg(long)]
        init: bool,
    },
}
