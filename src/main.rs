//! Slack Channel Export - incremental channel history export to CSV.
//!
//! Exports each channel to `<channel>.csv`, resolving user ids to names and
//! flattening threads. Every run resumes after the newest timestamp already in
//! the file, so repeated runs only append new messages.
//!
//!   slack-channel-export export                  # all cached channels
//!   slack-channel-export export -c general       # one channel
//!   slack-channel-export channels --refresh      # refetch the channel list
//!   slack-channel-export status                  # last export per channel

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_channel_report, format_channels_table, format_members_table, format_status_table,
    format_summary, load_channel_list, load_members, load_user_directory, BlockingPacer,
    ExportOptions, ExportService, Fetcher, RetryPolicy,
};
use cli::{Cli, Commands};
use domain::config::ENV_STOP;
use domain::{AppConfig, AppError, CancellationToken, Channel};
use infrastructure::{
    ensure_config_exists, load_config, load_credentials, read_channels, read_watermark,
    resolve_config_path, ExportEncoding, HttpTransport,
};

type SlackFetcher = Fetcher<HttpTransport, BlockingPacer>;

/// Exit status after a second interrupt.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        config: config_path,
        command,
        ..
    } = cli;

    let mut config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    config.apply_env(|name| std::env::var(name).ok());

    match command {
        Commands::Export {
            channels,
            auto_join,
            refresh_members,
            refresh_channels,
            all_channels,
        } => {
            config.behavior.auto_join |= auto_join;
            config.behavior.refresh_members |= refresh_members;
            config.behavior.refresh_channels |= refresh_channels;
            if all_channels {
                config.include_unjoined_channels();
            }
            cmd_export(&config, &channels)
        }
        Commands::Channels { refresh } => cmd_channels(&config, refresh),
        Commands::Members { refresh } => cmd_members(&config, refresh),
        Commands::Status => cmd_status(&config),
        Commands::Config { init } => cmd_config(&config, config_path.as_deref(), init),
    }
}

/// Export command.
fn cmd_export(config: &AppConfig, selected: &[String]) -> anyhow::Result<()> {
    let options = ExportOptions::from_config(config)?;
    let cancel = cancellation_token(config);
    let fetcher = connect(config, cancel.clone())?;
    install_interrupt_handler(cancel);

    let Some(users) = until_stopped(load_user_directory(
        &fetcher,
        &config.paths.members,
        config.behavior.refresh_members,
        config.api.max_pages,
    ))
    .context("Failed to load members")?
    else {
        return Ok(());
    };

    let Some(channels) = until_stopped(load_channel_list(
        &fetcher,
        &config.paths.channels,
        config.behavior.refresh_channels,
        config.behavior.only_joined,
        config.api.max_pages,
    ))
    .context("Failed to load channel list")?
    else {
        return Ok(());
    };

    let channels = select_channels(channels, selected)?;
    if channels.is_empty() {
        println!("No channels to export.");
        return Ok(());
    }

    let service = ExportService::new(&fetcher, &users, options);
    let summary = service.export_all(&channels, |report| {
        println!("{}", format_channel_report(report));
    });

    println!();
    println!("{}", format_summary(&summary));

    Ok(())
}

/// List channels command.
fn cmd_channels(config: &AppConfig, refresh: bool) -> anyhow::Result<()> {
    let cancel = cancellation_token(config);
    let fetcher = connect(config, cancel.clone())?;
    install_interrupt_handler(cancel);

    let Some(channels) = until_stopped(load_channel_list(
        &fetcher,
        &config.paths.channels,
        refresh || config.behavior.refresh_channels,
        config.behavior.only_joined,
        config.api.max_pages,
    ))?
    else {
        return Ok(());
    };

    println!("{}", format_channels_table(&channels));
    println!("Total: {} channel(s)", channels.len());
    Ok(())
}

/// List members command.
fn cmd_members(config: &AppConfig, refresh: bool) -> anyhow::Result<()> {
    let cancel = cancellation_token(config);
    let fetcher = connect(config, cancel.clone())?;
    install_interrupt_handler(cancel);

    let Some(members) = until_stopped(load_members(
        &fetcher,
        &config.paths.members,
        refresh || config.behavior.refresh_members,
        config.api.max_pages,
    ))?
    else {
        return Ok(());
    };

    println!("{}", format_members_table(&members));
    println!("Total: {} member(s)", members.len());
    Ok(())
}

/// Status command. Reads only local files.
fn cmd_status(config: &AppConfig) -> anyhow::Result<()> {
    if !config.paths.channels.exists() {
        println!(
            "No channel list at {}. Run `slack-channel-export channels` first.",
            config.paths.channels.display()
        );
        return Ok(());
    }

    let encoding = ExportEncoding::for_label(&config.export.encoding)?;
    let zone = config.export_zone();
    let rows: Vec<_> = read_channels(&config.paths.channels)?
        .into_iter()
        .map(|channel| {
            let watermark = read_watermark(&config.channel_export_path(&channel), encoding, zone);
            (channel, watermark)
        })
        .collect();

    println!("{}", format_status_table(&rows, zone));
    Ok(())
}

/// Config command.
fn cmd_config(config: &AppConfig, explicit: Option<&Path>, init: bool) -> anyhow::Result<()> {
    let path = resolve_config_path(explicit).unwrap_or_else(AppConfig::default_config_path);

    if init {
        if ensure_config_exists(&path)? {
            println!("{} Created {}", "✓".green().bold(), path.display());
        } else {
            println!("Config already exists: {}", path.display());
        }
        return Ok(());
    }

    let source = if path.exists() {
        path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("{} {}", "Config:".bold(), source);
    println!();
    print!(
        "{}",
        toml::to_string_pretty(config).context("Failed to render configuration")?
    );
    Ok(())
}

/// Stop triggers: interrupt, the sentinel file and the environment toggle.
fn cancellation_token(config: &AppConfig) -> CancellationToken {
    let cancel = CancellationToken::new()
        .with_sentinel(config.paths.stop_file.clone())
        .with_env_toggle(ENV_STOP);

    if cancel.is_cancelled() {
        tracing::warn!(
            stop_file = %config.paths.stop_file.display(),
            "Stop already requested; remove the stop file or unset {ENV_STOP} to run"
        );
    }
    cancel
}

/// Loads credentials and builds the retrying API client.
fn connect(config: &AppConfig, cancel: CancellationToken) -> anyhow::Result<SlackFetcher> {
    let credentials = load_credentials(&config.paths.credentials).with_context(|| {
        format!(
            "Failed to load credentials from {}",
            config.paths.credentials.display()
        )
    })?;
    tracing::debug!(?credentials, "Loaded credentials");

    let transport = HttpTransport::new(
        &config.api.base_url,
        credentials,
        Duration::from_secs(config.api.timeout_secs),
    )?;

    Ok(Fetcher::new(
        transport,
        BlockingPacer::new(cancel.clone()),
        RetryPolicy::from_config(config),
        cancel,
    ))
}

/// Maps a stop during bootstrap to `None` so the command ends quietly.
fn until_stopped<T>(result: domain::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AppError::Cancelled) => {
            println!("{}", "Stopped before export started.".yellow());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Keeps the channels named on the command line, by name or id.
fn select_channels(channels: Vec<Channel>, selected: &[String]) -> anyhow::Result<Vec<Channel>> {
    if selected.is_empty() {
        return Ok(channels);
    }

    let unknown: Vec<&str> = selected
        .iter()
        .filter(|s| !channels.iter().any(|c| &c.name == *s || &c.id == *s))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        bail!(
            "Unknown channel(s): {} (try `channels --refresh` or `export --all-channels`)",
            unknown.join(", ")
        );
    }

    Ok(channels
        .into_iter()
        .filter(|c| selected.iter().any(|s| s == &c.name || s == &c.id))
        .collect())
}

/// Turns the first Ctrl-C into a graceful stop; a second one exits at once.
fn install_interrupt_handler(cancel: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Interrupt handling unavailable");
                    return;
                }
            };

            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!(
                    "{}",
                    "Interrupt received, stopping after the current step (Ctrl-C again to abort)"
                        .yellow()
                );
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Aborted.".red());
                    std::process::exit(EXIT_INTERRUPTED);
                }
            });
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to start interrupt handler");
    }
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<Channel> {
        vec![Channel::new("C1", "general"), Channel::new("C2", "random")]
    }

    #[test]
    fn test_select_all_when_none_named() {
        assert_eq!(select_channels(channels(), &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_select_by_name_or_id() {
        let picked = select_channels(channels(), &["C2".to_string()]).unwrap();
        assert_eq!(picked, vec![Channel::new("C2", "random")]);

        let picked = select_channels(channels(), &["general".to_string()]).unwrap();
        assert_eq!(picked[0].id, "C1");
    }

    #[test]
    fn test_select_unknown_channel_fails() {
        let err = select_channels(channels(), &["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_until_stopped_swallows_cancellation() {
        assert!(until_stopped::<()>(Err(AppError::Cancelled)).unwrap().is_none());
        assert_eq!(until_stopped(Ok(3)).unwrap(), Some(3));
        assert!(until_stopped::<()>(Err(AppError::InvalidData {
            message: "x".into()
        }))
        .is_err());
    }
}
