//! SQLite storage for log entries
//!
//! Opening, schema creation, in-place migration, rotation of broken
//! database files, and the SQL statements the engine runs.

use crate::config::DatabaseConfig;
use crate::logging::entry::{LogEntry, LoggingEventType, LoggingLevel, LoggingSource};
use crate::logging::error::{LogEngineError, Result};
use crate::logging::filter::LogFilter;
use crate::logging::job::BindValue;
use crate::logging::types::{RuleId, ThingId};
use crate::logging::value::{deserialize_value, serialize_value, LogValue};
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Connection, Row, SqliteConnection};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DB_SCHEMA_VERSION: i64 = 3;

const ENTRY_COLUMNS: &str =
    "timestamp, loggingLevel, sourceType, typeId, deviceId, value, loggingEventType, active, errorCode";

fn connect_options(config: &DatabaseConfig) -> Result<SqliteConnectOptions> {
    if !config.driver.eq_ignore_ascii_case("sqlite") {
        return Err(LogEngineError::Config(format!(
            "unsupported database driver '{}'",
            config.driver
        )));
    }

    let options = if config.is_in_memory() {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
    };

    Ok(options
        .busy_timeout(Duration::from_secs(30))
        .pragma("synchronous", "NORMAL"))
}

/// Open the configured database and bring its schema up to date
pub async fn open_database(config: &DatabaseConfig) -> Result<SqliteConnection> {
    let options = connect_options(config)?;

    if let Some(parent) = Path::new(&config.path).parent() {
        if !config.is_in_memory() && !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut conn = SqliteConnection::connect_with(&options).await?;
    if let Err(e) = init_schema(&mut conn).await {
        if let Err(close_err) = conn.close().await {
            tracing::debug!(error = %close_err, "Failed to close log database after init error");
        }
        return Err(e);
    }

    tracing::info!(path = %config.path, "Opened log database");
    Ok(conn)
}

async fn table_names(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table'",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(names)
}

/// Create missing tables and migrate older schema versions
pub async fn init_schema(conn: &mut SqliteConnection) -> Result<()> {
    let tables = table_names(conn).await?;
    let has = |name: &str| tables.iter().any(|t| t == name);

    if !has("metadata") {
        sqlx::query("CREATE TABLE metadata (\"key\" VARCHAR(10), data VARCHAR(40))")
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO metadata (\"key\", data) VALUES ('version', ?)")
            .bind(DB_SCHEMA_VERSION.to_string())
            .execute(&mut *conn)
            .await?;
    }

    let version = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(data AS INTEGER) FROM metadata WHERE \"key\" = 'version'",
    )
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| LogEngineError::Schema("no version in metadata".to_string()))?;

    let mut version = version;
    if version == 2 && DB_SCHEMA_VERSION == 3 && has("entries") {
        migrate_v2_to_v3(conn).await?;
        version = DB_SCHEMA_VERSION;
    }

    if version != DB_SCHEMA_VERSION {
        tracing::warn!(
            found = version,
            expected = DB_SCHEMA_VERSION,
            "Log database schema version does not match, logging might fail"
        );
    } else {
        tracing::debug!(version = version, "Log database schema version matches");
    }

    if !has("sourceTypes") {
        sqlx::query("CREATE TABLE sourceTypes (id INT, name VARCHAR(40), PRIMARY KEY(id))")
            .execute(&mut *conn)
            .await?;
        for source in LoggingSource::ALL {
            insert_lookup(conn, "sourceTypes", source.as_i64(), source.name()).await?;
        }
    }

    if !has("loggingEventTypes") {
        sqlx::query("CREATE TABLE loggingEventTypes (id INT, name VARCHAR(40), PRIMARY KEY(id))")
            .execute(&mut *conn)
            .await?;
        for event_type in LoggingEventType::ALL {
            insert_lookup(conn, "loggingEventTypes", event_type.as_i64(), event_type.name()).await?;
        }
    }

    if !has("entries") {
        sqlx::query(
            "CREATE TABLE entries (
                timestamp INT,
                loggingLevel INT,
                sourceType INT,
                typeId VARCHAR(38),
                deviceId VARCHAR(38),
                value VARCHAR(100),
                loggingEventType INT,
                active BOOL,
                errorCode INT,
                FOREIGN KEY(sourceType) REFERENCES sourceTypes(id),
                FOREIGN KEY(loggingEventType) REFERENCES loggingEventTypes(id)
            )",
        )
        .execute(&mut *conn)
        .await?;
        tracing::debug!("Created entries table");
    }

    // Probe the table so a corrupted file fails here rather than on the first append
    sqlx::query("SELECT COUNT(*) FROM entries")
        .fetch_one(&mut *conn)
        .await?;

    Ok(())
}

async fn insert_lookup(conn: &mut SqliteConnection, table: &str, id: i64, name: &str) -> Result<()> {
    sqlx::query(&format!("INSERT INTO {} (id, name) VALUES (?, ?)", table))
        .bind(id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Rewrite every stored value as a serialized string value
async fn migrate_v2_to_v3(conn: &mut SqliteConnection) -> Result<()> {
    tracing::info!("Migrating log database from version 2 to version 3");
    let started = Instant::now();

    let mut tx = conn.begin().await?;
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT rowid, value FROM entries WHERE value IS NOT NULL AND value != ''",
    )
    .fetch_all(&mut *tx)
    .await?;

    let total = rows.len();
    let mut last_progress = 0;
    for (migrated, (rowid, old_value)) in rows.into_iter().enumerate() {
        let new_value = serialize_value(&LogValue::String(old_value));
        sqlx::query("UPDATE entries SET value = ? WHERE rowid = ?")
            .bind(new_value)
            .bind(rowid)
            .execute(&mut *tx)
            .await?;

        let progress = (migrated + 1) * 100 / total;
        if progress / 10 != last_progress / 10 {
            tracing::debug!(progress = progress, "Migration progress");
            last_progress = progress;
        }
    }

    sqlx::query("UPDATE metadata SET data = ? WHERE \"key\" = 'version'")
        .bind(DB_SCHEMA_VERSION.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        entries = total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Migrated log database to version 3"
    );
    Ok(())
}

fn companion(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Move a broken database file aside as `<path>.<n>`, using the first free `n`.
///
/// WAL and shared-memory files move along with it.
pub async fn rotate(path: &Path) -> Result<PathBuf> {
    let mut index = 1;
    let target = loop {
        let candidate = companion(path, &format!(".{}", index));
        if !tokio::fs::try_exists(&candidate).await? {
            break candidate;
        }
        index += 1;
    };

    tracing::warn!(
        from = %path.display(),
        to = %target.display(),
        "Backing up log database"
    );
    tokio::fs::rename(path, &target).await?;

    for suffix in ["-wal", "-shm"] {
        let source = companion(path, suffix);
        if tokio::fs::try_exists(&source).await? {
            tokio::fs::rename(&source, companion(&target, suffix)).await?;
        }
    }

    Ok(target)
}

pub(crate) fn insert_statement(entry: &LogEntry) -> (String, Vec<BindValue>) {
    let sql = format!(
        "INSERT INTO entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ENTRY_COLUMNS
    );
    let binds = vec![
        BindValue::Integer(entry.timestamp.timestamp()),
        BindValue::Integer(entry.level.as_i64()),
        BindValue::Integer(entry.source.as_i64()),
        BindValue::Text(entry.type_id.hyphenated().to_string()),
        BindValue::Text(entry.thing_id.as_uuid().hyphenated().to_string()),
        BindValue::Text(serialize_value(&entry.value)),
        BindValue::Integer(entry.event_type.as_i64()),
        BindValue::Integer(i64::from(entry.active)),
        BindValue::Integer(i64::from(entry.error_code)),
    ];
    (sql, binds)
}

pub(crate) fn select_statement(filter: &LogFilter) -> (String, Vec<BindValue>) {
    let where_clause = filter.query_string();
    let mut sql = format!("SELECT {} FROM entries", ENTRY_COLUMNS);
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    sql.push_str(" ORDER BY timestamp DESC, rowid DESC");
    sql.push_str(&filter.limit_clause());

    let binds = filter.values().into_iter().map(BindValue::Text).collect();
    (sql, binds)
}

pub(crate) fn things_statement() -> (String, Vec<BindValue>) {
    (
        "SELECT deviceId FROM entries WHERE deviceId IS NOT NULL AND deviceId != ? GROUP BY deviceId"
            .to_string(),
        vec![BindValue::Text(Uuid::nil().hyphenated().to_string())],
    )
}

pub(crate) fn count_statement() -> String {
    "SELECT COUNT(*) FROM entries".to_string()
}

/// Delete all but the newest `keep` rows
pub(crate) fn trim_statement(keep: u64) -> String {
    format!(
        "DELETE FROM entries WHERE rowid IN \
         (SELECT rowid FROM entries ORDER BY timestamp DESC, rowid DESC LIMIT -1 OFFSET {})",
        keep
    )
}

pub(crate) fn remove_thing_statement(thing_id: ThingId) -> (String, Vec<BindValue>) {
    (
        "DELETE FROM entries WHERE deviceId = ?".to_string(),
        vec![BindValue::Text(thing_id.as_uuid().hyphenated().to_string())],
    )
}

pub(crate) fn remove_rule_statement(rule_id: RuleId) -> (String, Vec<BindValue>) {
    (
        "DELETE FROM entries WHERE typeId = ?".to_string(),
        vec![BindValue::Text(rule_id.as_uuid().hyphenated().to_string())],
    )
}

pub(crate) fn clear_statement() -> String {
    "DELETE FROM entries".to_string()
}

fn parse_uuid(text: Option<String>) -> Result<Uuid> {
    match text.as_deref().map(str::trim) {
        None | Some("") => Ok(Uuid::nil()),
        Some(text) => Ok(Uuid::parse_str(text)?),
    }
}

pub(crate) fn entry_from_row(row: &SqliteRow) -> Result<LogEntry> {
    let timestamp: i64 = row.try_get("timestamp")?;
    let timestamp = DateTime::from_timestamp(timestamp, 0).ok_or(
        LogEngineError::InvalidDiscriminant {
            kind: "timestamp",
            value: timestamp,
        },
    )?;

    let value: Option<String> = row.try_get("value")?;
    let active: Option<i64> = row.try_get("active")?;
    let error_code: Option<i64> = row.try_get("errorCode")?;

    Ok(LogEntry {
        timestamp,
        level: LoggingLevel::try_from(row.try_get::<i64, _>("loggingLevel")?)?,
        source: LoggingSource::try_from(row.try_get::<i64, _>("sourceType")?)?,
        event_type: LoggingEventType::try_from(row.try_get::<i64, _>("loggingEventType")?)?,
        type_id: parse_uuid(row.try_get("typeId")?)?,
        thing_id: ThingId(parse_uuid(row.try_get("deviceId")?)?),
        value: value.as_deref().map(deserialize_value).unwrap_or_default(),
        active: active.unwrap_or(0) != 0,
        error_code: error_code.unwrap_or(0) as i32,
    })
}

pub(crate) fn thing_from_row(row: &SqliteRow) -> Result<ThingId> {
    Ok(ThingId(parse_uuid(row.try_get("deviceId")?)?))
}
