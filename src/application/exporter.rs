//! Incremental channel export.
//!
//! For each channel: read the watermark from the existing export file, fetch
//! history newer than it, flatten threads, then create or append the file.
//! A failing channel is reported and the run moves on to the next one.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{
    AppConfig, AppError, Channel, ChannelReport, ChannelStatus, ExportRecord, ExportSummary,
    ExportZone, RecordOutcome, Result, Timestamp, UserDirectory, Watermark,
};
use crate::infrastructure::{read_watermark, ApiMethod, ExportEncoding, ExportWriter, Transport};

use super::directory::join_channel;
use super::fetcher::Fetcher;
use super::pacing::Pacer;
use super::paginator::{paginate, PageRequest};
use super::parser::{page_items, parse_message, RawMessage};
use super::threads::{flatten_thread, ThreadOptions};

/// Slack error code for history requests on a channel the bot has not joined.
const NOT_IN_CHANNEL: &str = "not_in_channel";

/// Settings for an export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub export_dir: PathBuf,
    pub encoding: ExportEncoding,
    pub zone: ExportZone,
    pub history_page_size: u32,
    pub max_pages: usize,
    /// Join and retry once when history answers `not_in_channel`.
    pub auto_join: bool,
    pub channel_pause: Duration,
    pub thread_pause: Duration,
    /// Log progress every N records; 0 disables it.
    pub progress_every: usize,
}

impl ExportOptions {
    /// # Errors
    /// Returns error if the configured export encoding is unknown.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            export_dir: config.export.dir.clone(),
            encoding: ExportEncoding::for_label(&config.export.encoding)?,
            zone: config.export_zone(),
            history_page_size: config.api.history_page_size,
            max_pages: config.api.max_pages,
            auto_join: config.behavior.auto_join,
            channel_pause: config.channel_pause(),
            thread_pause: config.thread_pause(),
            progress_every: config.export.progress_every,
        })
    }

    /// Whether the `count`-th gathered record gets a progress line.
    const fn progress_due(&self, count: usize) -> bool {
        self.progress_every > 0 && count % self.progress_every == 0
    }

    const fn thread_options(&self) -> ThreadOptions {
        ThreadOptions {
            max_pages: self.max_pages,
            pause: self.thread_pause,
        }
    }
}

/// Records gathered for one channel before writing.
#[derive(Debug, Default)]
struct Batch {
    records: Vec<ExportRecord>,
    skipped: usize,
    partial: bool,
}

/// Exports channels one after another.
pub struct ExportService<'a, T, P> {
    fetcher: &'a Fetcher<T, P>,
    users: &'a UserDirectory,
    options: ExportOptions,
    writer: ExportWriter,
}

impl<'a, T: Transport, P: Pacer> ExportService<'a, T, P> {
    #[must_use]
    pub fn new(fetcher: &'a Fetcher<T, P>, users: &'a UserDirectory, options: ExportOptions) -> Self {
        let writer = ExportWriter::new(options.encoding, options.zone);
        Self {
            fetcher,
            users,
            options,
            writer,
        }
    }

    /// Exports every channel in order, pausing between channels.
    ///
    /// `on_done` sees each report as soon as its channel finishes. A stop
    /// request ends the run before the next channel starts.
    pub fn export_all(
        &self,
        channels: &[Channel],
        mut on_done: impl FnMut(&ChannelReport),
    ) -> ExportSummary {
        let cancel = self.fetcher.cancel_token();
        let mut summary = ExportSummary::default();

        tracing::info!(channels = channels.len(), "Starting export");

        for (index, channel) in channels.iter().enumerate() {
            if index > 0 {
                self.fetcher.pacer().pause(self.options.channel_pause);
            }
            if cancel.is_cancelled() {
                summary.not_started = channels.len() - index;
                tracing::warn!(remaining = summary.not_started, "Stop requested, ending run");
                break;
            }

            let report = self.export_channel(channel);
            on_done(&report);
            summary.channels.push(report);
        }

        summary.cancelled = cancel.is_cancelled();

        tracing::info!(
            exported = summary.channels.len(),
            records = summary.total_records(),
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "Export finished"
        );

        summary
    }

    /// Exports a single channel.
    ///
    /// Records gathered before a stop request are still written.
    pub fn export_channel(&self, channel: &Channel) -> ChannelReport {
        let path = self.options.export_dir.join(channel.export_file_name());
        let watermark = read_watermark(&path, self.options.encoding, self.options.zone);

        tracing::info!(
            channel = %channel.name,
            since = ?watermark.timestamp().map(Timestamp::to_slack),
            "Exporting channel"
        );

        let status = match self
            .collect(channel, watermark)
            .and_then(|batch| Ok((self.writer.write(&path, &batch.records)?, batch)))
        {
            Ok((write, batch)) => {
                tracing::info!(
                    channel = %channel.name,
                    records = batch.records.len(),
                    skipped = batch.skipped,
                    ?write,
                    "Channel exported"
                );
                ChannelStatus::Exported {
                    records: batch.records.len(),
                    skipped: batch.skipped,
                    write,
                    partial: batch.partial,
                }
            }
            Err(e) => {
                tracing::error!(channel = %channel.name, error = %e, "Channel export failed");
                ChannelStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ChannelReport {
            channel: channel.name.clone(),
            path,
            watermark,
            status,
        }
    }

    fn collect(&self, channel: &Channel, watermark: Watermark) -> Result<Batch> {
        let history = self.fetch_history_joining(channel, watermark)?;
        let cancel = self.fetcher.cancel_token();
        let mut batch = Batch::default();

        for raw in &history {
            if cancel.is_cancelled() {
                break;
            }

            let message = match parse_message(raw) {
                RecordOutcome::Parsed(message) => message,
                RecordOutcome::Skipped(reason) => {
                    tracing::debug!(channel = %channel.name, %reason, "Skipping message");
                    batch.skipped += 1;
                    continue;
                }
            };

            if message.is_thread_root() {
                match flatten_thread(
                    self.fetcher,
                    &channel.id,
                    message.ts,
                    watermark,
                    self.users,
                    self.options.thread_options(),
                ) {
                    Ok(thread) => {
                        batch.skipped += thread.skipped;
                        for record in thread.records {
                            self.push(&mut batch, channel, record);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(channel = %channel.name, thread = %message.ts, error = %e, "Skipping thread");
                    }
                }
            } else if watermark.admits(message.ts) {
                let record = ExportRecord::from_message(&message, self.users, None);
                self.push(&mut batch, channel, record);
            }
        }

        batch.partial = cancel.is_cancelled();
        Ok(batch)
    }

    fn push(&self, batch: &mut Batch, channel: &Channel, record: ExportRecord) {
        batch.records.push(record);
        let count = batch.records.len();
        if self.options.progress_due(count) {
            tracing::info!(channel = %channel.name, records = count, "Export progress");
        }
    }

    fn fetch_history_joining(&self, channel: &Channel, watermark: Watermark) -> Result<Vec<RawMessage>> {
        match self.fetch_history(channel, watermark) {
            Err(e) if e.is_api_error(NOT_IN_CHANNEL) && self.options.auto_join => {
                if self.fetcher.cancel_token().is_cancelled() {
                    return Err(AppError::Cancelled);
                }
                tracing::info!(channel = %channel.name, "Bot is not a member, joining");
                join_channel(self.fetcher, channel)?;
                self.fetch_history(channel, watermark)
            }
            other => other,
        }
    }

    /// History strictly newer than the watermark, in the order Slack returns it.
    fn fetch_history(&self, channel: &Channel, watermark: Watermark) -> Result<Vec<RawMessage>> {
        let mut request = PageRequest::new(ApiMethod::ConversationsHistory)
            .param("channel", &channel.id)
            .param("limit", self.options.history_page_size);
        if let Some(ts) = watermark.timestamp() {
            request = request
                .param("oldest", ts.to_slack())
                .param("inclusive", "false");
        }

        paginate(self.fetcher, &request, self.options.max_pages, |page| {
            page_items::<RawMessage>(page, "messages")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetcher::RetryPolicy;
    use crate::application::testing::{api_error, page, RecordingPacer, ScriptedTransport};
    use crate::domain::{CancellationToken, Member, WriteOutcome};
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const GENERAL_EXPORT: &str = "text,user,ts\r\n\
        hello,Alice,2023-11-14 22:13:20+00:00\r\n\
        world,U2,2023-11-14 22:13:21+00:00\r\n\
        first,U2,2023-11-14 22:13:23+00:00\r\n\
        Re:second,Alice,2023-11-14 22:13:24+00:00\r\n";

    fn options(dir: &Path) -> ExportOptions {
        ExportOptions {
            export_dir: dir.to_path_buf(),
            encoding: ExportEncoding::default(),
            zone: ExportZone::Utc,
            history_page_size: 1000,
            max_pages: 10,
            auto_join: false,
            channel_pause: Duration::from_secs(10),
            thread_pause: Duration::from_millis(500),
            progress_every: 10,
        }
    }

    fn users() -> UserDirectory {
        UserDirectory::from_members([Member {
            id: "U1".into(),
            name: "Alice".into(),
        }])
    }

    fn general_history() -> Value {
        page(
            "messages",
            json!([
                {"ts": "1700000000.000000", "user": "U1", "text": "hello"},
                {"ts": "1700000001.000000", "user": "U2", "text": "world"},
                {"ts": "1700000002.000000", "user": "U1", "text": "question", "reply_count": 2}
            ]),
            None,
        )
    }

    fn general_replies() -> Value {
        page(
            "messages",
            json!([
                {"ts": "1700000003.000000", "user": "U2", "text": "first"},
                {"ts": "1700000004.000000", "user": "U1", "text": "second"}
            ]),
            None,
        )
    }

    fn script_general(transport: &ScriptedTransport) {
        transport.respond(ApiMethod::ConversationsHistory, general_history());
        transport.respond(ApiMethod::ConversationsReplies, general_replies());
    }

    fn fetcher<'a>(
        transport: &'a ScriptedTransport,
        pacer: &'a RecordingPacer,
        cancel: CancellationToken,
    ) -> Fetcher<&'a ScriptedTransport, &'a RecordingPacer> {
        Fetcher::new(transport, pacer, RetryPolicy::default(), cancel)
    }

    #[test]
    fn test_new_channel_export() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        script_general(&transport);
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));

        let report = service.export_channel(&Channel::new("C1", "general"));

        assert_eq!(
            report.status,
            ChannelStatus::Exported {
                records: 4,
                skipped: 0,
                write: WriteOutcome::Created,
                partial: false
            }
        );
        assert_eq!(report.watermark, Watermark::none());
        let content = fs::read_to_string(dir.path().join("general.csv")).unwrap();
        assert_eq!(content, GENERAL_EXPORT);

        let history = transport.params_of(ApiMethod::ConversationsHistory);
        assert!(!history[0].iter().any(|(k, _)| k == "oldest"));
        assert_eq!(pacer.pauses(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn test_second_run_is_byte_identical() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        // Upstream ignores `oldest` here, so the watermark filter alone must
        // suppress the repeats.
        script_general(&transport);
        script_general(&transport);
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));
        let channel = Channel::new("C1", "general");

        service.export_channel(&channel);
        let first = fs::read(dir.path().join("general.csv")).unwrap();
        let report = service.export_channel(&channel);
        let second = fs::read(dir.path().join("general.csv")).unwrap();

        assert_eq!(first, second);
        assert_eq!(report.records(), 0);
        assert_eq!(
            report.watermark,
            Watermark::at(Timestamp::from_secs(1_700_000_004))
        );

        let history = transport.params_of(ApiMethod::ConversationsHistory);
        assert!(history[1].contains(&("oldest".to_string(), "1700000004.000000".to_string())));
        assert!(history[1].contains(&("inclusive".to_string(), "false".to_string())));
    }

    #[test]
    fn test_append_only_newer_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("general.csv");
        let existing = "text,user,ts\r\nold,Alice,2023-11-14 22:13:21\r\n";
        fs::write(&path, existing).unwrap();

        let transport = ScriptedTransport::new();
        transport.respond(
            ApiMethod::ConversationsHistory,
            page(
                "messages",
                json!([
                    {"ts": "1700000000.000000", "user": "U1", "text": "older"},
                    {"ts": "1700000001.000000", "user": "U1", "text": "same"},
                    {"ts": "1700000001.000001", "user": "U1", "text": "newer"}
                ]),
                None,
            ),
        );
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));

        let report = service.export_channel(&Channel::new("C1", "general"));

        assert_eq!(report.records(), 1);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            format!("{existing}newer,Alice,2023-11-14 22:13:21.000001+00:00\r\n")
        );
    }

    #[test]
    fn test_resume_inside_repeated_local_hour() {
        std::env::set_var("TZ", "America/New_York");

        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        // 01:30 EDT, then 01:00 EST half an hour later on the same night.
        transport.respond(
            ApiMethod::ConversationsHistory,
            page(
                "messages",
                json!([{"ts": "1699162200.000000", "user": "U1", "text": "before"}]),
                None,
            ),
        );
        transport.respond(
            ApiMethod::ConversationsHistory,
            page(
                "messages",
                json!([{"ts": "1699164000.000000", "user": "U1", "text": "after"}]),
                None,
            ),
        );
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let mut opts = options(dir.path());
        opts.zone = ExportZone::Local;
        let service = ExportService::new(&fetcher, &users, opts);
        let channel = Channel::new("C1", "general");

        service.export_channel(&channel);
        let report = service.export_channel(&channel);

        assert_eq!(
            report.watermark,
            Watermark::at(Timestamp::from_secs(1_699_162_200))
        );
        assert_eq!(report.records(), 1);
        let history = transport.params_of(ApiMethod::ConversationsHistory);
        assert!(history[1].contains(&("oldest".to_string(), "1699162200.000000".to_string())));

        let content = fs::read_to_string(dir.path().join("general.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().last().unwrap().starts_with("after,Alice,"));
    }

    #[test]
    fn test_progress_every_n_records() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.progress_every = 2;

        let due: Vec<usize> = (1..=5).filter(|&n| opts.progress_due(n)).collect();
        assert_eq!(due, vec![2, 4]);

        opts.progress_every = 0;
        assert!(!(1..=20).any(|n| opts.progress_due(n)));
    }

    #[test]
    fn test_stop_between_channels() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        script_general(&transport);
        let cancel = CancellationToken::new();
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, cancel.clone());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));
        let channels = [
            Channel::new("C1", "general"),
            Channel::new("C2", "random"),
            Channel::new("C3", "dev"),
        ];

        let summary = service.export_all(&channels, |_| cancel.cancel());

        assert!(summary.cancelled);
        assert_eq!(summary.channels.len(), 1);
        assert_eq!(summary.not_started, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("general.csv")).unwrap(),
            GENERAL_EXPORT
        );
        assert!(!dir.path().join("random.csv").exists());
        assert_eq!(transport.call_count(ApiMethod::ConversationsHistory), 1);
    }

    #[test]
    fn test_stop_mid_channel_writes_gathered_records() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond(
            ApiMethod::ConversationsHistory,
            page(
                "messages",
                json!([
                    {"ts": "1700000000.000000", "user": "U1", "text": "root", "reply_count": 1},
                    {"ts": "1700000009.000000", "user": "U1", "text": "after"}
                ]),
                None,
            ),
        );
        transport.respond(
            ApiMethod::ConversationsReplies,
            page(
                "messages",
                json!([
                    {"ts": "1700000000.000000", "user": "U1", "text": "root", "reply_count": 1},
                    {"ts": "1700000001.000000", "user": "U2", "text": "reply"}
                ]),
                None,
            ),
        );
        let cancel = CancellationToken::new();
        // The pause after the first thread requests the stop.
        let pacer = RecordingPacer::cancelling_after(1, cancel.clone());
        let fetcher = fetcher(&transport, &pacer, cancel);
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));

        let report = service.export_channel(&Channel::new("C1", "general"));

        assert_eq!(
            report.status,
            ChannelStatus::Exported {
                records: 2,
                skipped: 0,
                write: WriteOutcome::Created,
                partial: true
            }
        );
        let content = fs::read_to_string(dir.path().join("general.csv")).unwrap();
        assert_eq!(
            content,
            "text,user,ts\r\n\
             root,Alice,2023-11-14 22:13:20+00:00\r\n\
             Re:reply,U2,2023-11-14 22:13:21+00:00\r\n"
        );
    }

    #[test]
    fn test_not_in_channel_joins_and_retries() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::ConversationsHistory, api_error("not_in_channel"));
        transport.respond(ApiMethod::ConversationsJoin, json!({"ok": true}));
        script_general(&transport);
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let mut opts = options(dir.path());
        opts.auto_join = true;
        let service = ExportService::new(&fetcher, &users, opts);

        let report = service.export_channel(&Channel::new("C1", "general"));

        assert_eq!(report.records(), 4);
        assert_eq!(
            transport.methods(),
            vec![
                ApiMethod::ConversationsHistory,
                ApiMethod::ConversationsJoin,
                ApiMethod::ConversationsHistory,
                ApiMethod::ConversationsReplies,
            ]
        );
    }

    #[test]
    fn test_failed_channel_does_not_stop_run() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond(ApiMethod::ConversationsHistory, api_error("not_in_channel"));
        script_general(&transport);
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));
        let channels = [Channel::new("C0", "secret"), Channel::new("C1", "general")];

        let mut seen = Vec::new();
        let summary = service.export_all(&channels, |report| seen.push(report.channel.clone()));

        assert_eq!(seen, vec!["secret", "general"]);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.total_records(), 4);
        assert!(!summary.cancelled);
        assert!(!dir.path().join("secret.csv").exists());
        assert!(matches!(
            &summary.channels[0].status,
            ChannelStatus::Failed { reason } if reason.contains("not_in_channel")
        ));
        assert_eq!(
            pacer.pauses(),
            vec![Duration::from_secs(10), Duration::from_millis(500)]
        );
    }

    #[test]
    fn test_skipped_messages_are_counted() {
        let dir = tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport.respond(
            ApiMethod::ConversationsHistory,
            page(
                "messages",
                json!([
                    {"ts": "1700000000.000000", "user": "U1", "text": "kept"},
                    {"ts": "1700000001.000000", "user": "U1"},
                    {"user": "U1", "text": "no ts"}
                ]),
                None,
            ),
        );
        let pacer = RecordingPacer::default();
        let fetcher = fetcher(&transport, &pacer, CancellationToken::new());
        let users = users();
        let service = ExportService::new(&fetcher, &users, options(dir.path()));

        let report = service.export_channel(&Channel::new("C1", "general"));

        assert!(matches!(
            report.status,
            ChannelStatus::Exported { records: 1, skipped: 2, .. }
        ));
    }
}
