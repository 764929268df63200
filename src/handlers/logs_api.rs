//! Log history HTTP API
//!
//! Query entries with the same criteria a [`LogFilter`] offers, list the
//! things that have history, and delete history.

use super::AppState;
use crate::error::AppError;
use crate::logging::{LogEntry, LogFilter, LogValue, ThingId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Query parameters for the logs API. List parameters are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Sources, e.g. `events,states`
    pub sources: Option<String>,
    /// `info` and/or `alert`
    pub levels: Option<String>,
    pub event_types: Option<String>,
    pub type_ids: Option<String>,
    pub thing_ids: Option<String>,
    /// Exact values; numbers and booleans keep their type
    pub values: Option<String>,

    /// Show logs since N seconds ago
    pub since: Option<i64>,

    /// Show logs until N seconds ago
    pub until: Option<i64>,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

fn parse_list<T>(raw: &Option<String>) -> Result<Vec<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>()
                .map_err(|e| AppError::BadRequest(format!("'{}': {}", item, e)))
        })
        .collect()
}

fn seconds_ago(now: DateTime<Utc>, seconds: i64, name: &str) -> Result<DateTime<Utc>, AppError> {
    Duration::try_seconds(seconds)
        .and_then(|ago| now.checked_sub_signed(ago))
        .ok_or_else(|| AppError::BadRequest(format!("'{}' is out of range: {}", name, seconds)))
}

impl LogQueryParams {
    pub fn to_filter(&self, now: DateTime<Utc>) -> Result<LogFilter, AppError> {
        let mut filter = LogFilter::new();

        let start = self.since.map(|s| seconds_ago(now, s, "since")).transpose()?;
        let end = self.until.map(|u| seconds_ago(now, u, "until")).transpose()?;
        filter.add_time_filter(start, end);

        for source in parse_list(&self.sources)? {
            filter.add_logging_source(source);
        }
        for level in parse_list(&self.levels)? {
            filter.add_logging_level(level);
        }
        for event_type in parse_list(&self.event_types)? {
            filter.add_logging_event_type(event_type);
        }
        for type_id in parse_list::<Uuid>(&self.type_ids)? {
            filter.add_type_id(type_id);
        }
        for thing_id in parse_list::<ThingId>(&self.thing_ids)? {
            filter.add_thing_id(thing_id);
        }
        if let Some(values) = &self.values {
            for value in values.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                filter.add_value(LogValue::parse_literal(value));
            }
        }

        filter.set_limit(Some(self.limit));
        filter.set_offset(self.offset);
        Ok(filter)
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub total: usize,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ThingsResponse {
    pub total: usize,
    pub things: Vec<ThingId>,
}

/// GET /api/v1/logs - Query log entries, newest first
///
/// Example: GET /api/v1/logs?sources=events,states&since=3600&limit=10
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let filter = params.to_filter(Utc::now())?;
    let entries = state.engine.fetch_log_entries(&filter).wait().await?;

    Ok(Json(LogsResponse {
        total: entries.len(),
        entries,
    }))
}

/// GET /api/v1/logs/things - Things that have log entries
pub async fn get_things(State(state): State<AppState>) -> Result<Json<ThingsResponse>, AppError> {
    let things = state.engine.fetch_things().wait().await?;

    Ok(Json(ThingsResponse {
        total: things.len(),
        things,
    }))
}

/// DELETE /api/v1/logs - Remove all entries
pub async fn clear_logs(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.clear_database();
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "accepted" })))
}

/// DELETE /api/v1/logs/things/{thing_id} - Remove the entries of one thing
pub async fn delete_thing_logs(
    State(state): State<AppState>,
    Path(thing_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let thing_id = ThingId::from_str(&thing_id)
        .map_err(|e| AppError::BadRequest(format!("invalid thing id '{}': {}", thing_id, e)))?;

    state.engine.remove_thing_logs(thing_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "thing_id": thing_id })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::logging::{LogEngine, LoggingLevel, LoggingSource};
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        AppState {
            engine: Arc::new(LogEngine::open(DatabaseConfig::in_memory()).await),
            metrics: Arc::new(recorder.handle()),
        }
    }

    #[test]
    fn test_params_to_filter() {
        let params = LogQueryParams {
            sources: Some("events, states".to_string()),
            levels: Some("alert".to_string()),
            values: Some("42".to_string()),
            limit: 10,
            ..Default::default()
        };

        let filter = params.to_filter(Utc::now()).unwrap();
        assert_eq!(filter.sources(), &[LoggingSource::Events, LoggingSource::States]);
        assert_eq!(filter.levels(), &[LoggingLevel::Alert]);
        assert_eq!(filter.values().len(), 1);
        assert_eq!(filter.limit(), Some(10));
    }

    #[test]
    fn test_unknown_source_is_bad_request() {
        let params = LogQueryParams {
            sources: Some("lamps".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            params.to_filter(Utc::now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_huge_time_offsets_are_bad_requests() {
        let since = LogQueryParams {
            since: Some(i64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            since.to_filter(Utc::now()),
            Err(AppError::BadRequest(_))
        ));

        let until = LogQueryParams {
            until: Some(i64::MIN),
            ..Default::default()
        };
        assert!(matches!(
            until.to_filter(Utc::now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_get_logs_and_things() {
        let state = test_state().await;
        let thing = ThingId::new_v4();
        state.engine.append_log_entry(
            LogEntry::new(LoggingSource::Actions)
                .with_thing_id(thing)
                .with_value(1),
        );
        state.engine.wait_for_idle().await;

        let Json(logs) = get_logs(State(state.clone()), Query(LogQueryParams {
            limit: 100,
            ..Default::default()
        }))
        .await
        .unwrap();
        assert_eq!(logs.total, 1);
        assert_eq!(logs.entries[0].thing_id, thing);

        let Json(things) = get_things(State(state.clone())).await.unwrap();
        assert_eq!(things.things, vec![thing]);

        state.engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_thing_logs_rejects_bad_id() {
        let state = test_state().await;
        let result = delete_thing_logs(State(state.clone()), Path("not-a-uuid".to_string())).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        state.engine.shutdown().await;
    }
}
