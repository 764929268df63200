//! Logs query command
//!
//! Query and display stored log entries from the SQLite database.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use colored::Colorize;
use log_engine::config::Config;
use log_engine::logging::{
    LogEngine, LogEntry, LogFilter, LogValue, LoggingEventType, LoggingLevel, LoggingSource,
    ThingId,
};
use uuid::Uuid;

/// Query and display logs
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    /// Filter by source (system, events, actions, states, rules, browseractions)
    #[arg(short, long, value_delimiter = ',')]
    pub source: Vec<LoggingSource>,

    /// Filter by level (info, alert)
    #[arg(short, long, value_delimiter = ',')]
    pub level: Vec<LoggingLevel>,

    /// Filter by event type (trigger, activechange, enabledchange, ...)
    #[arg(short, long, value_delimiter = ',')]
    pub event_type: Vec<LoggingEventType>,

    /// Filter by event, state, action or rule id
    #[arg(long, value_delimiter = ',')]
    pub type_id: Vec<Uuid>,

    /// Filter by thing id
    #[arg(short, long, value_delimiter = ',')]
    pub thing: Vec<ThingId>,

    /// Filter by exact value
    #[arg(long)]
    pub value: Vec<String>,

    /// Show logs since N seconds ago (e.g., 3600 for last hour)
    #[arg(long)]
    pub since: Option<i64>,

    /// Show logs until N seconds ago
    #[arg(long)]
    pub until: Option<i64>,

    /// Maximum number of results
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Skip the N newest matches
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

impl LogsArgs {
    fn to_filter(&self) -> Result<LogFilter> {
        let now = Utc::now();
        let mut filter = LogFilter::new();

        filter.add_time_filter(
            self.since.map(|s| seconds_ago(now, s, "--since")).transpose()?,
            self.until.map(|u| seconds_ago(now, u, "--until")).transpose()?,
        );
        self.source.iter().for_each(|s| filter.add_logging_source(*s));
        self.level.iter().for_each(|l| filter.add_logging_level(*l));
        self.event_type.iter().for_each(|e| filter.add_logging_event_type(*e));
        self.type_id.iter().for_each(|id| filter.add_type_id(*id));
        self.thing.iter().for_each(|id| filter.add_thing_id(*id));
        self.value
            .iter()
            .for_each(|v| filter.add_value(LogValue::parse_literal(v)));

        filter.set_limit(Some(self.limit));
        filter.set_offset(self.offset);
        Ok(filter)
    }
}

fn seconds_ago(now: DateTime<Utc>, seconds: i64, flag: &str) -> Result<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|ago| now.checked_sub_signed(ago))
        .with_context(|| format!("{} {} is out of range", flag, seconds))
}

/// Execute the logs command
pub async fn execute(cfg: Config, args: LogsArgs) -> Result<()> {
    let engine = LogEngine::open(cfg.database).await;
    let result = engine.fetch_log_entries(&args.to_filter()?).wait().await;
    engine.shutdown().await;
    let entries = result?;

    if entries.is_empty() {
        println!("{}", "No logs found matching the criteria".yellow());
        return Ok(());
    }

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&entries)?;
            println!("{}", json);
        }
        _ => display_logs_text(&entries),
    }

    Ok(())
}

/// Display logs in human-friendly text format
fn display_logs_text(entries: &[LogEntry]) {
    println!("{}", format!("Found {} log entries", entries.len()).bold());
    println!();

    for entry in entries {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S");

        let level_colored = match entry.level {
            LoggingLevel::Alert => format!("ALERT {}", entry.error_code).red().bold(),
            LoggingLevel::Info => "INFO".green(),
        };

        let thing_display = if entry.thing_id.is_nil() {
            String::new()
        } else {
            format!(" thing={}", entry.thing_id)
        };

        let detail = match entry.event_type {
            LoggingEventType::ActiveChange | LoggingEventType::EnabledChange => {
                format!("{} active={}", short_name(entry.event_type.name()), entry.active)
            }
            other => short_name(other.name()).to_string(),
        };

        println!(
            "{} {} {} {}{} {}",
            timestamp.to_string().dimmed(),
            level_colored,
            short_name(entry.source.name()).cyan(),
            detail,
            thing_display.dimmed(),
            entry.value
        );
    }
}

/// "LoggingSourceEvents" -> "Events"
fn short_name(name: &str) -> &str {
    ["LoggingSource", "LoggingEventType", "LoggingLevel"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}
