//! Terminal output for the CLI commands.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{
    Channel, ChannelReport, ChannelStatus, ExportSummary, ExportZone, Member, Watermark,
    WriteOutcome,
};

/// Formats the channel list as a table.
pub fn format_channels_table(channels: &[Channel]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Channel", "ID", "Export file"]);

    for channel in channels {
        table.add_row(vec![
            truncate(&channel.name, 40),
            channel.id.clone(),
            channel.export_file_name(),
        ]);
    }

    table.to_string()
}

/// Formats the member directory as a table, sorted by name.
pub fn format_members_table(members: &[Member]) -> String {
    let mut sorted: Vec<&Member> = members.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["User ID", "Name"]);
    for member in sorted {
        table.add_row(vec![member.id.as_str(), member.name.as_str()]);
    }

    table.to_string()
}

/// Formats each channel with the timestamp of its newest exported record.
pub fn format_status_table(rows: &[(Channel, Watermark)], zone: ExportZone) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Channel", "ID", "Last exported"]);

    for (channel, watermark) in rows {
        let last = watermark
            .timestamp()
            .and_then(|ts| ts.to_display(zone))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![truncate(&channel.name, 40), channel.id.clone(), last]);
    }

    table.to_string()
}

/// One line per finished channel.
pub fn format_channel_report(report: &ChannelReport) -> String {
    match &report.status {
        ChannelStatus::Exported {
            records,
            skipped,
            write,
            partial,
        } => {
            let action = match write {
                WriteOutcome::Created => "created",
                WriteOutcome::Appended => "appended",
                WriteOutcome::Unchanged => "unchanged",
            };
            let mut line = format!(
                "{} {}: {} new records ({action})",
                "✓".green(),
                report.channel.bold(),
                records.to_string().cyan()
            );
            if *skipped > 0 {
                line.push_str(&format!(", {skipped} skipped"));
            }
            if *partial {
                line.push_str(&format!(" {}", "[interrupted]".yellow()));
            }
            line
        }
        ChannelStatus::Failed { reason } => format!(
            "{} {}: {}",
            "✗".red(),
            report.channel.bold(),
            reason.red()
        ),
    }
}

/// Formats the totals of a run.
pub fn format_summary(summary: &ExportSummary) -> String {
    let mut out = format!(
        "{}\n  Channels exported: {}\n  New records: {}\n  Failed: {}",
        "📊 Export summary".bold(),
        (summary.channels.len() - summary.failed()).to_string().cyan(),
        summary.total_records().to_string().green(),
        summary.failed().to_string().red()
    );

    if summary.cancelled {
        out.push_str(&format!(
            "\n  {} ({} channels not started)",
            "Stopped early".yellow(),
            summary.not_started
        ));
    }

    out
}

/// Truncates to `max_chars` characters with an ellipsis.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
