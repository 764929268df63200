//! Database jobs and the handles callers use to await fetch results

use crate::logging::entry::LogEntry;
use crate::logging::error::{LogEngineError, Result};
use crate::logging::types::{RuleId, ThingId};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

pub type JobId = u64;

/// Flood control bucket: one per (type id, thing id) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloodKey {
    pub type_id: Uuid,
    pub thing_id: ThingId,
}

/// A parameter bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Integer(i64),
    Text(String),
}

/// What a job does, and what to do with its outcome
#[derive(Debug)]
pub(crate) enum JobKind {
    Append(LogEntry),
    CountEntries,
    Trim { keep: u64, started: Instant },
    FetchEntries(oneshot::Sender<Result<Vec<LogEntry>>>),
    FetchThings(oneshot::Sender<Result<Vec<ThingId>>>),
    RemoveThingLogs(ThingId),
    RemoveRuleLogs(RuleId),
    Clear,
}

impl JobKind {
    fn returns_rows(&self) -> bool {
        matches!(
            self,
            JobKind::CountEntries | JobKind::FetchEntries(_) | JobKind::FetchThings(_)
        )
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            JobKind::Append(_) => "append",
            JobKind::CountEntries => "count",
            JobKind::Trim { .. } => "trim",
            JobKind::FetchEntries(_) => "fetch_entries",
            JobKind::FetchThings(_) => "fetch_things",
            JobKind::RemoveThingLogs(_) => "remove_thing_logs",
            JobKind::RemoveRuleLogs(_) => "remove_rule_logs",
            JobKind::Clear => "clear",
        }
    }
}

/// One SQL statement with its bound parameters and, once executed, its outcome.
///
/// Jobs move between the queue, the execution task and the completion
/// handler; only one of them holds a job at any time.
pub struct DatabaseJob {
    pub(crate) id: JobId,
    pub(crate) kind: JobKind,
    pub(crate) query: String,
    pub(crate) bind_values: Vec<BindValue>,
    pub(crate) rows: Vec<SqliteRow>,
    pub(crate) rows_affected: u64,
    pub(crate) error: Option<sqlx::Error>,
    pub(crate) executed_query: Option<String>,
}

impl DatabaseJob {
    pub(crate) fn new(
        id: JobId,
        kind: JobKind,
        query: String,
        bind_values: Vec<BindValue>,
    ) -> Self {
        Self {
            id,
            kind,
            query,
            bind_values,
            rows: Vec::new(),
            rows_affected: 0,
            error: None,
            executed_query: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn bind_values(&self) -> &[BindValue] {
        &self.bind_values
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn error(&self) -> Option<&sqlx::Error> {
        self.error.as_ref()
    }

    /// Statement text as handed to SQLite, set after execution
    pub fn executed_query(&self) -> Option<&str> {
        self.executed_query.as_deref()
    }

    /// Only appends take part in flood control
    pub(crate) fn flood_key(&self) -> Option<FloodKey> {
        match &self.kind {
            JobKind::Append(entry) => Some(FloodKey {
                type_id: entry.type_id,
                thing_id: entry.thing_id,
            }),
            _ => None,
        }
    }

    /// Run the statement on `conn`, recording rows or the error on the job
    pub(crate) async fn execute(&mut self, conn: &mut SqliteConnection) {
        let outcome = run_statement(
            conn,
            &self.query,
            &self.bind_values,
            self.kind.returns_rows(),
        )
        .await;

        self.executed_query = Some(self.query.clone());
        match outcome {
            Ok((rows, rows_affected)) => {
                self.rows = rows;
                self.rows_affected = rows_affected;
            }
            Err(e) => self.error = Some(e),
        }
    }
}

async fn run_statement(
    conn: &mut SqliteConnection,
    sql: &str,
    bind_values: &[BindValue],
    returns_rows: bool,
) -> std::result::Result<(Vec<SqliteRow>, u64), sqlx::Error> {
    let mut query = sqlx::query(sql);
    for value in bind_values {
        query = match value {
            BindValue::Integer(i) => query.bind(*i),
            BindValue::Text(s) => query.bind(s.as_str()),
        };
    }

    if returns_rows {
        let rows = query.fetch_all(&mut *conn).await?;
        Ok((rows, 0))
    } else {
        let result = query.execute(&mut *conn).await?;
        Ok((Vec::new(), result.rows_affected()))
    }
}

impl fmt::Debug for DatabaseJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseJob")
            .field("id", &self.id)
            .field("kind", &self.kind.label())
            .field("query", &self.query)
            .field("bind_values", &self.bind_values)
            .field("rows", &self.rows.len())
            .field("rows_affected", &self.rows_affected)
            .field("error", &self.error)
            .finish()
    }
}

/// Pending result of a fetch, resolved by the engine once the job ran
#[derive(Debug)]
pub struct FetchJob<T> {
    receiver: oneshot::Receiver<Result<Vec<T>>>,
}

/// Pending result of [`LogEngine::fetch_log_entries`](crate::logging::LogEngine::fetch_log_entries)
pub type LogEntriesFetchJob = FetchJob<LogEntry>;

/// Pending result of [`LogEngine::fetch_things`](crate::logging::LogEngine::fetch_things)
pub type ThingsFetchJob = FetchJob<ThingId>;

impl<T> FetchJob<T> {
    pub(crate) fn channel() -> (oneshot::Sender<Result<Vec<T>>>, Self) {
        let (tx, receiver) = oneshot::channel();
        (tx, Self { receiver })
    }

    /// Wait for the fetch to complete, failures included
    pub async fn wait(self) -> Result<Vec<T>> {
        self.receiver
            .await
            .unwrap_or(Err(LogEngineError::Canceled))
    }

    /// Wait for the fetch and return its rows. Failures yield an empty list.
    pub async fn results(self) -> Vec<T> {
        match self.wait().await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Log fetch failed, returning no results");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::LoggingSource;

    #[test]
    fn test_only_appends_have_a_flood_key() {
        let thing = ThingId::new_v4();
        let type_id = Uuid::new_v4();
        let entry = LogEntry::new(LoggingSource::Events)
            .with_thing_id(thing)
            .with_type_id(type_id);

        let append = DatabaseJob::new(1, JobKind::Append(entry), String::new(), vec![]);
        assert_eq!(append.flood_key(), Some(FloodKey { type_id, thing_id: thing }));

        let count = DatabaseJob::new(2, JobKind::CountEntries, String::new(), vec![]);
        assert_eq!(count.flood_key(), None);
    }

    #[tokio::test]
    async fn test_fetch_job_reports_cancellation() {
        let (tx, job) = ThingsFetchJob::channel();
        drop(tx);
        assert!(matches!(job.wait().await, Err(LogEngineError::Canceled)));
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_empty_results() {
        let (tx, job) = LogEntriesFetchJob::channel();
        tx.send(Err(LogEngineError::Unavailable)).unwrap();
        assert!(job.results().await.is_empty());
    }
}
