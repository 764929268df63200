//! The log engine: a single background task that owns the SQLite connection
//! and runs queued jobs against it one at a time.
//!
//! Callers talk to the task through [`LogEngine`], which never blocks. Each
//! request becomes a [`DatabaseJob`] on the pump's queue. The pump hands the
//! connection and the head job to a spawned task, and gets both back when
//! the statement has finished. Only then does the next job start.

use crate::config::DatabaseConfig;
use crate::logging::database::{self, entry_from_row, open_database, rotate, thing_from_row};
use crate::logging::entry::{LogEntry, LoggingEventType, LoggingLevel, LoggingSource};
use crate::logging::error::LogEngineError;
use crate::logging::filter::LogFilter;
use crate::logging::job::{
    BindValue, DatabaseJob, FetchJob, JobId, JobKind, LogEntriesFetchJob, ThingsFetchJob,
};
use crate::logging::queue::JobQueue;
use crate::logging::types::{
    Action, BrowserAction, BrowserItemAction, Event, Param, Rule, RuleId, ThingId,
};
use crate::logging::value::LogValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, Row, SqliteConnection};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published by the engine
#[derive(Debug, Clone)]
pub enum LogEngineEvent {
    /// An entry was written
    EntryAdded(LogEntry),
    /// Entries were removed by a trim, a removal or a clear
    DatabaseUpdated,
    JobsRunningChanged(bool),
    /// A statement failed; `query` is the statement text
    JobFailed { query: String, error: String },
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub jobs_executed: u64,
    pub job_errors: u64,
    pub flood_discards: u64,
    pub entry_count: u64,
    pub queue_length: usize,
    /// Highest number of statements ever running at once
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    jobs_executed: AtomicU64,
    job_errors: AtomicU64,
    flood_discards: AtomicU64,
    entry_count: AtomicU64,
    queue_length: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

enum Command {
    Enqueue {
        kind: JobKind,
        query: String,
        bind_values: Vec<BindValue>,
        priority: bool,
    },
    SetMaxEntries {
        max_entries: Option<u64>,
        trim_size: u64,
    },
    WaitIdle(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the log engine.
///
/// All logging calls return immediately. Dropping the last handle lets the
/// background task finish queued work and close the database; call
/// [`LogEngine::shutdown`] to wait for that.
pub struct LogEngine {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LogEngineEvent>,
    jobs_running: watch::Receiver<bool>,
    counters: Arc<Counters>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl LogEngine {
    /// Open the database described by `config` and start the background task.
    ///
    /// A database that fails to open is moved aside and recreated once. If
    /// that fails too the engine keeps running without storage: writes are
    /// dropped and fetches fail with [`LogEngineError::Unavailable`].
    pub async fn open(config: DatabaseConfig) -> Self {
        let conn = connect_with_recovery(&config).await;

        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (running_tx, jobs_running) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let max_entries = config.max_entries_limit();
        let trim_size = config.effective_trim_size();
        let pump = Pump {
            queue: JobQueue::new(config.max_queue_length, config.flood_limit),
            config,
            conn,
            current: None,
            next_job_id: 0,
            entry_count: 0,
            max_entries,
            trim_size,
            trim_pending: false,
            trim_announced: false,
            malformed: false,
            idle_waiters: Vec::new(),
            events: events.clone(),
            jobs_running: running_tx,
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(pump.run(receiver));

        Self {
            commands,
            events,
            jobs_running,
            counters,
            pump: Mutex::new(Some(handle)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEngineEvent> {
        self.events.subscribe()
    }

    /// Whether a job is queued or executing
    pub fn jobs_running(&self) -> bool {
        *self.jobs_running.borrow()
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            jobs_executed: c.jobs_executed.load(Ordering::Relaxed),
            job_errors: c.job_errors.load(Ordering::Relaxed),
            flood_discards: c.flood_discards.load(Ordering::Relaxed),
            entry_count: c.entry_count.load(Ordering::Relaxed),
            queue_length: c.queue_length.load(Ordering::Relaxed),
            peak_in_flight: c.peak_in_flight.load(Ordering::Relaxed),
        }
    }

    /// Resolve once no job is queued or executing
    pub async fn wait_for_idle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::WaitIdle(tx)) {
            let _ = rx.await;
        }
    }

    /// Finish queued work and close the database
    pub async fn shutdown(&self) {
        let handle = self.pump.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        self.send(Command::Shutdown);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Log engine task failed during shutdown");
        }
    }

    fn send(&self, command: Command) -> bool {
        if self.commands.send(command).is_err() {
            tracing::debug!("Log engine is stopped, dropping request");
            return false;
        }
        true
    }

    fn submit(&self, kind: JobKind, query: String, bind_values: Vec<BindValue>, priority: bool) {
        self.send(Command::Enqueue {
            kind,
            query,
            bind_values,
            priority,
        });
    }

    /// Queue an entry for writing
    pub fn append_log_entry(&self, entry: LogEntry) {
        let (query, bind_values) = database::insert_statement(&entry);
        self.submit(JobKind::Append(entry), query, bind_values, false);
    }

    pub fn fetch_log_entries(&self, filter: &LogFilter) -> LogEntriesFetchJob {
        let (reply, job) = FetchJob::channel();
        let (query, bind_values) = database::select_statement(filter);
        tracing::debug!(query = %query, "Fetching log entries");
        self.submit(JobKind::FetchEntries(reply), query, bind_values, true);
        job
    }

    /// Distinct ids of things that have log entries
    pub fn fetch_things(&self) -> ThingsFetchJob {
        let (reply, job) = FetchJob::channel();
        let (query, bind_values) = database::things_statement();
        self.submit(JobKind::FetchThings(reply), query, bind_values, true);
        job
    }

    /// Change the retention policy. `trim_size` defaults to 1% of `max_entries`.
    pub fn set_max_log_entries(&self, max_entries: Option<u64>, trim_size: Option<u64>) {
        let trim_size = trim_size.unwrap_or_else(|| max_entries.map_or(0, |max| max / 100));
        self.send(Command::SetMaxEntries {
            max_entries,
            trim_size,
        });
    }

    pub fn clear_database(&self) {
        tracing::info!("Clearing log database");
        self.submit(JobKind::Clear, database::clear_statement(), Vec::new(), false);
    }

    pub fn remove_thing_logs(&self, thing_id: ThingId) {
        tracing::debug!(thing_id = %thing_id, "Deleting log entries of thing");
        let (query, bind_values) = database::remove_thing_statement(thing_id);
        self.submit(JobKind::RemoveThingLogs(thing_id), query, bind_values, false);
    }

    pub fn remove_rule_logs(&self, rule_id: RuleId) {
        tracing::debug!(rule_id = %rule_id, "Deleting log entries of rule");
        let (query, bind_values) = database::remove_rule_statement(rule_id);
        self.submit(JobKind::RemoveRuleLogs(rule_id), query, bind_values, false);
    }

    /// Server start (`active`) or stop
    pub fn log_system_event(&self, timestamp: DateTime<Utc>, active: bool, level: LoggingLevel) {
        self.append_log_entry(
            LogEntry::at(timestamp, LoggingSource::System)
                .with_level(level)
                .with_event_type(LoggingEventType::ActiveChange)
                .with_active(active),
        );
    }

    /// State changes log their new value, other events all their params
    pub fn log_event(&self, event: &Event) {
        let (source, params) = if event.is_state_change {
            (LoggingSource::States, &event.params[..event.params.len().min(1)])
        } else {
            (LoggingSource::Events, &event.params[..])
        };

        let mut values = param_values(params);
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            LogValue::List(values)
        };

        self.append_log_entry(
            LogEntry::new(source)
                .with_type_id(event.event_type_id)
                .with_thing_id(event.thing_id)
                .with_value(value),
        );
    }

    pub fn log_action(&self, action: &Action, level: LoggingLevel, error_code: i32) {
        let mut values = param_values(&action.params);
        let value = match values.len() {
            0 => LogValue::Null,
            1 => values.remove(0),
            _ => LogValue::List(values),
        };

        self.append_log_entry(
            LogEntry::new(LoggingSource::Actions)
                .with_level(level)
                .with_error_code(error_code)
                .with_type_id(action.action_type_id)
                .with_thing_id(action.thing_id)
                .with_value(value),
        );
    }

    pub fn log_browser_action(&self, action: &BrowserAction, level: LoggingLevel, error_code: i32) {
        self.append_log_entry(
            LogEntry::new(LoggingSource::BrowserActions)
                .with_level(level)
                .with_error_code(error_code)
                .with_thing_id(action.thing_id)
                .with_value(action.item_id.as_str()),
        );
    }

    pub fn log_browser_item_action(
        &self,
        action: &BrowserItemAction,
        level: LoggingLevel,
        error_code: i32,
    ) {
        self.append_log_entry(
            LogEntry::new(LoggingSource::BrowserActions)
                .with_level(level)
                .with_error_code(error_code)
                .with_thing_id(action.thing_id)
                .with_type_id(action.action_type_id)
                .with_value(action.item_id.as_str()),
        );
    }

    pub fn log_rule_triggered(&self, rule: &Rule) {
        self.append_log_entry(rule_entry(rule, LoggingEventType::Trigger));
    }

    pub fn log_rule_active_changed(&self, rule: &Rule) {
        self.append_log_entry(rule_entry(rule, LoggingEventType::ActiveChange).with_active(rule.active));
    }

    pub fn log_rule_enabled_changed(&self, rule: &Rule, enabled: bool) {
        self.append_log_entry(rule_entry(rule, LoggingEventType::EnabledChange).with_active(enabled));
    }

    pub fn log_rule_actions_executed(&self, rule: &Rule) {
        self.append_log_entry(rule_entry(rule, LoggingEventType::ActionsExecuted));
    }

    pub fn log_rule_exit_actions_executed(&self, rule: &Rule) {
        self.append_log_entry(rule_entry(rule, LoggingEventType::ExitActionsExecuted));
    }
}

fn param_values(params: &[Param]) -> Vec<LogValue> {
    params.iter().map(|p| p.value.clone()).collect()
}

fn rule_entry(rule: &Rule, event_type: LoggingEventType) -> LogEntry {
    LogEntry::new(LoggingSource::Rules)
        .with_type_id(rule.id.as_uuid())
        .with_event_type(event_type)
}

async fn connect_with_recovery(config: &DatabaseConfig) -> Option<SqliteConnection> {
    match open_database(config).await {
        Ok(conn) => return Some(conn),
        Err(e) => tracing::warn!(
            error = %e,
            path = %config.path,
            "Error opening log database, trying to correct it"
        ),
    }

    if !config.is_in_memory() {
        let path = Path::new(&config.path);
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            if let Err(e) = rotate(path).await {
                tracing::error!(error = %e, "Failed to move broken log database aside");
            }
        }
    }

    match open_database(config).await {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::error!(error = %e, "Error fixing log database, giving up. Logs can't be stored.");
            None
        }
    }
}

type Finished = (SqliteConnection, DatabaseJob);

async fn join_current(current: &mut Option<JoinHandle<Finished>>) -> Result<Finished, JoinError> {
    match current.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

enum Step {
    Finished(Result<Finished, JoinError>),
    Command(Option<Command>),
}

/// Complete a job that will never run
fn abandon(job: DatabaseJob) {
    match job.kind {
        JobKind::FetchEntries(reply) => {
            let _ = reply.send(Err(LogEngineError::Unavailable));
        }
        JobKind::FetchThings(reply) => {
            let _ = reply.send(Err(LogEngineError::Unavailable));
        }
        kind => tracing::debug!(job = kind.label(), "Log database unavailable, dropping job"),
    }
}

struct Pump {
    config: DatabaseConfig,
    /// `None` while a job holds it, or for good once the database is gone
    conn: Option<SqliteConnection>,
    queue: JobQueue,
    current: Option<JoinHandle<Finished>>,
    next_job_id: JobId,
    entry_count: u64,
    max_entries: Option<u64>,
    trim_size: u64,
    trim_pending: bool,
    trim_announced: bool,
    malformed: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
    events: broadcast::Sender<LogEngineEvent>,
    jobs_running: watch::Sender<bool>,
    counters: Arc<Counters>,
}

impl Pump {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.check_db_size();
        self.process_queue().await;

        loop {
            // Completions first so a busy channel cannot stall the queue
            let step = tokio::select! {
                biased;
                finished = join_current(&mut self.current) => Step::Finished(finished),
                command = commands.recv() => Step::Command(command),
            };

            match step {
                Step::Finished(finished) => self.job_finished(finished),
                Step::Command(None) | Step::Command(Some(Command::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command),
            }

            self.process_queue().await;
            self.notify_idle();
        }

        tracing::debug!(queued = self.queue.len(), "Finishing queued log jobs");
        while self.current.is_some() {
            let finished = join_current(&mut self.current).await;
            self.job_finished(finished);
            self.process_queue().await;
        }
        self.notify_idle();

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "Failed to close log database");
            }
        }
        tracing::info!("Log engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                kind,
                query,
                bind_values,
                priority,
            } => self.enqueue_job(kind, query, bind_values, priority),
            Command::SetMaxEntries {
                max_entries,
                trim_size,
            } => {
                tracing::info!(max_entries = ?max_entries, trim_size = trim_size, "Log retention changed");
                self.max_entries = max_entries;
                self.trim_size = trim_size;
                self.trim_announced = false;
                self.check_db_size();
            }
            Command::WaitIdle(waiter) => self.idle_waiters.push(waiter),
            Command::Shutdown => {}
        }
    }

    fn enqueue_job(&mut self, kind: JobKind, query: String, bind_values: Vec<BindValue>, priority: bool) {
        self.next_job_id += 1;
        let job = DatabaseJob::new(self.next_job_id, kind, query, bind_values);

        if let Some(discarded) = self.queue.push(job, priority) {
            if let Some(key) = discarded.flood_key() {
                tracing::warn!(
                    type_id = %key.type_id,
                    thing_id = %key.thing_id,
                    queued = self.queue.len(),
                    "Log queue flooded, discarding oldest entry of this source"
                );
            }
            self.counters.flood_discards.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_flood_discard();
        }
        self.publish_queue_length();
    }

    async fn process_queue(&mut self) {
        if self.current.is_some() {
            return;
        }

        let Some(mut job) = self.queue.pop_front() else {
            self.set_jobs_running(false);
            return;
        };
        self.publish_queue_length();

        if self.malformed {
            self.recover().await;
        }

        let Some(mut conn) = self.conn.take() else {
            abandon(job);
            for job in self.queue.drain() {
                abandon(job);
            }
            self.publish_queue_length();
            self.set_jobs_running(false);
            return;
        };

        self.set_jobs_running(true);
        let counters = Arc::clone(&self.counters);
        self.current = Some(tokio::spawn(async move {
            let in_flight = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            counters.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            let started = Instant::now();
            job.execute(&mut conn).await;
            crate::metrics::record_job(job.kind.label(), started.elapsed());

            counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            (conn, job)
        }));
    }

    fn job_finished(&mut self, finished: Result<Finished, JoinError>) {
        self.current = None;
        match finished {
            Ok((conn, job)) => {
                self.conn = Some(conn);
                self.counters.jobs_executed.fetch_add(1, Ordering::Relaxed);
                self.complete_job(job);
            }
            Err(e) => {
                // The connection went down with the task
                tracing::error!(error = %e, "Log database job aborted");
                self.counters.in_flight.store(0, Ordering::SeqCst);
                self.malformed = true;
            }
        }
    }

    fn complete_job(&mut self, job: DatabaseJob) {
        let DatabaseJob {
            kind,
            query,
            rows,
            rows_affected,
            error,
            executed_query,
            ..
        } = job;

        if let Some(error) = &error {
            self.report_failure(kind.label(), executed_query.as_deref().unwrap_or(&query), error);
        }

        match kind {
            JobKind::Append(entry) => {
                if error.is_some() {
                    tracing::warn!(entry = %entry, "Error writing log entry, the database will be repaired");
                    self.malformed = true;
                    return;
                }
                self.entry_count += 1;
                self.publish_entry_count();
                self.emit(LogEngineEvent::EntryAdded(entry));
                self.trim();
            }
            JobKind::CountEntries => {
                if error.is_some() {
                    return;
                }
                match rows.first().map(|row| row.try_get::<i64, _>(0)) {
                    Some(Ok(count)) => {
                        self.entry_count = u64::try_from(count).unwrap_or(0);
                        self.publish_entry_count();
                        tracing::debug!(entries = self.entry_count, "Log database size checked");
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "Unexpected result counting log entries"),
                    None => tracing::warn!("Counting log entries returned no rows"),
                }
                self.trim();
            }
            JobKind::Trim { keep, started } => {
                self.trim_pending = false;
                if error.is_some() {
                    return;
                }
                self.entry_count = self.entry_count.min(keep);
                self.publish_entry_count();
                tracing::debug!(
                    removed = rows_affected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Trimmed log database"
                );
                self.emit(LogEngineEvent::DatabaseUpdated);
            }
            JobKind::FetchEntries(reply) => {
                let result = match error {
                    Some(e) => Err(e.into()),
                    None => Ok(decode_rows(&rows, entry_from_row)),
                };
                let _ = reply.send(result);
            }
            JobKind::FetchThings(reply) => {
                let result = match error {
                    Some(e) => Err(e.into()),
                    None => Ok(decode_rows(&rows, thing_from_row)),
                };
                let _ = reply.send(result);
            }
            JobKind::RemoveThingLogs(_) | JobKind::RemoveRuleLogs(_) => {
                if error.is_some() {
                    return;
                }
                self.entry_count = self.entry_count.saturating_sub(rows_affected);
                self.publish_entry_count();
                self.emit(LogEngineEvent::DatabaseUpdated);
            }
            JobKind::Clear => {
                if error.is_none() {
                    self.entry_count = 0;
                    self.publish_entry_count();
                }
                self.emit(LogEngineEvent::DatabaseUpdated);
            }
        }
    }

    fn report_failure(&mut self, kind: &'static str, query: &str, error: &sqlx::Error) {
        let code = error
            .as_database_error()
            .and_then(|e| e.code().map(|c| c.into_owned()));
        tracing::warn!(
            job = kind,
            query = %query,
            code = ?code,
            error = %error,
            "Log database job failed"
        );
        self.counters.job_errors.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_job_error(kind);
        self.emit(LogEngineEvent::JobFailed {
            query: query.to_string(),
            error: error.to_string(),
        });
    }

    /// Queue a count of the stored entries
    fn check_db_size(&mut self) {
        if self.max_entries.is_none() {
            return;
        }
        self.enqueue_job(JobKind::CountEntries, database::count_statement(), Vec::new(), true);
    }

    fn trim(&mut self) {
        let Some(max_entries) = self.max_entries else {
            return;
        };
        if self.trim_pending || self.entry_count < max_entries {
            return;
        }

        let keep = max_entries.saturating_sub(self.trim_size);
        if !self.trim_announced {
            tracing::info!(
                max_entries = max_entries,
                trim_size = self.trim_size,
                "Log database reached its size limit, removing oldest entries"
            );
            self.trim_announced = true;
        }

        self.trim_pending = true;
        self.enqueue_job(
            JobKind::Trim {
                keep,
                started: Instant::now(),
            },
            database::trim_statement(keep),
            Vec::new(),
            true,
        );
    }

    /// Close, move aside and recreate the database file
    async fn recover(&mut self) {
        self.malformed = false;
        tracing::warn!(path = %self.config.path, "Log database looks broken, starting a new one");

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "Failed to close broken log database");
            }
        }

        if !self.config.is_in_memory() {
            if let Err(e) = rotate(Path::new(&self.config.path)).await {
                tracing::error!(error = %e, "Failed to move broken log database aside");
            }
        }

        match open_database(&self.config).await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.entry_count = 0;
                self.trim_pending = false;
                self.publish_entry_count();
                tracing::info!("Log database recreated");
                self.emit(LogEngineEvent::DatabaseUpdated);
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fixing log database, giving up. Logs can't be stored.");
            }
        }
    }

    fn set_jobs_running(&mut self, running: bool) {
        let changed = self.jobs_running.send_if_modified(|current| {
            if *current == running {
                return false;
            }
            *current = running;
            true
        });
        if changed {
            self.emit(LogEngineEvent::JobsRunningChanged(running));
        }
    }

    fn notify_idle(&mut self) {
        if self.current.is_some() || !self.queue.is_empty() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn emit(&self, event: LogEngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_entry_count(&self) {
        self.counters.entry_count.store(self.entry_count, Ordering::Relaxed);
        crate::metrics::set_entry_count(self.entry_count);
    }

    fn publish_queue_length(&self) {
        self.counters.queue_length.store(self.queue.len(), Ordering::Relaxed);
        crate::metrics::set_queue_length(self.queue.len());
    }
}

fn decode_rows<T>(
    rows: &[sqlx::sqlite::SqliteRow],
    decode: impl Fn(&sqlx::sqlite::SqliteRow) -> crate::logging::error::Result<T>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable log row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_engine() -> LogEngine {
        LogEngine::open(DatabaseConfig::in_memory()).await
    }

    #[tokio::test]
    async fn test_state_change_logs_first_param() {
        let engine = memory_engine().await;
        let thing = ThingId::new_v4();
        engine.log_event(&Event {
            event_type_id: Uuid::new_v4(),
            thing_id: thing,
            params: vec![Param::new(Uuid::new_v4(), true)],
            is_state_change: true,
        });
        engine.log_event(&Event {
            event_type_id: Uuid::new_v4(),
            thing_id: thing,
            params: vec![Param::new(Uuid::new_v4(), 1), Param::new(Uuid::new_v4(), "two")],
            is_state_change: false,
        });
        engine.wait_for_idle().await;

        let entries = engine.fetch_log_entries(&LogFilter::new()).wait().await.unwrap();
        assert_eq!(entries.len(), 2);

        let state = entries.iter().find(|e| e.source == LoggingSource::States).unwrap();
        assert_eq!(state.value, LogValue::Bool(true));
        let event = entries.iter().find(|e| e.source == LoggingSource::Events).unwrap();
        assert_eq!(event.value, LogValue::List(vec![1.into(), "two".into()]));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_without_params_logs_null() {
        let engine = memory_engine().await;
        engine.log_action(
            &Action {
                action_type_id: Uuid::new_v4(),
                thing_id: ThingId::new_v4(),
                params: vec![],
            },
            LoggingLevel::Alert,
            7,
        );
        engine.wait_for_idle().await;

        let entries = engine.fetch_log_entries(&LogFilter::new()).results().await;
        assert_eq!(entries[0].value, LogValue::Null);
        assert_eq!(entries[0].level, LoggingLevel::Alert);
        assert_eq!(entries[0].error_code, 7);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_rule_entries_use_rule_id() {
        let engine = memory_engine().await;
        let rule = Rule {
            id: RuleId::new_v4(),
            active: true,
        };
        engine.log_rule_active_changed(&rule);
        engine.log_rule_enabled_changed(&rule, false);
        engine.log_rule_exit_actions_executed(&rule);
        engine.wait_for_idle().await;

        let mut filter = LogFilter::new();
        filter.add_type_id(rule.id.as_uuid());
        let entries = engine.fetch_log_entries(&filter).results().await;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.source == LoggingSource::Rules));

        let active = entries
            .iter()
            .find(|e| e.event_type == LoggingEventType::ActiveChange)
            .unwrap();
        assert!(active.active);
        let enabled = entries
            .iter()
            .find(|e| e.event_type == LoggingEventType::EnabledChange)
            .unwrap();
        assert!(!enabled.active);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_jobs_running_settles() {
        let engine = memory_engine().await;
        engine.log_system_event(Utc::now(), true, LoggingLevel::Info);
        engine.wait_for_idle().await;
        assert!(!engine.jobs_running());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let engine = memory_engine().await;
        let pending = {
            for _ in 0..20 {
                engine.log_system_event(Utc::now(), true, LoggingLevel::Info);
            }
            engine.fetch_things()
        };
        engine.shutdown().await;

        assert!(pending.wait().await.is_ok());
        assert_eq!(engine.stats().jobs_executed, 22);

        // Requests after shutdown are dropped
        let late = engine.fetch_log_entries(&LogFilter::new());
        assert!(matches!(late.wait().await, Err(LogEngineError::Canceled)));
    }

    #[tokio::test]
    async fn test_unusable_driver_makes_engine_unavailable() {
        let config = DatabaseConfig {
            driver: "mysql".to_string(),
            ..DatabaseConfig::in_memory()
        };
        let engine = LogEngine::open(config).await;
        engine.log_system_event(Utc::now(), true, LoggingLevel::Info);

        let result = engine.fetch_log_entries(&LogFilter::new()).wait().await;
        assert!(matches!(result, Err(LogEngineError::Unavailable)));
        engine.shutdown().await;
    }
}
