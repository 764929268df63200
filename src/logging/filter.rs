//! Query predicate builder for fetching log entries

use crate::logging::entry::{LoggingEventType, LoggingLevel, LoggingSource};
use crate::logging::types::ThingId;
use crate::logging::value::{serialize_value, LogValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time window. At least one bound is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Criteria for selecting log entries.
///
/// Categories are ANDed, entries within one category are ORed. Limit and
/// offset are not criteria: a filter with only a limit is still empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    time_ranges: Vec<TimeRange>,
    sources: Vec<LoggingSource>,
    levels: Vec<LoggingLevel>,
    event_types: Vec<LoggingEventType>,
    type_ids: Vec<Uuid>,
    thing_ids: Vec<ThingId>,
    values: Vec<LogValue>,
    limit: Option<usize>,
    offset: usize,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// `a = x` for one item, `(a = x OR a = y)` for several
fn or_group<T>(items: &[T], condition: impl Fn(&T) -> String) -> Option<String> {
    match items {
        [] => None,
        [single] => Some(condition(single)),
        many => Some(format!(
            "({})",
            many.iter().map(condition).collect::<Vec<_>>().join(" OR ")
        )),
    }
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a time window. A window without any bound is ignored.
    pub fn add_time_filter(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) {
        if start.is_none() && end.is_none() {
            tracing::debug!("Ignoring time filter without start and end");
            return;
        }
        push_unique(&mut self.time_ranges, TimeRange { start, end });
    }

    pub fn add_logging_source(&mut self, source: LoggingSource) {
        push_unique(&mut self.sources, source);
    }

    pub fn add_logging_level(&mut self, level: LoggingLevel) {
        push_unique(&mut self.levels, level);
    }

    pub fn add_logging_event_type(&mut self, event_type: LoggingEventType) {
        push_unique(&mut self.event_types, event_type);
    }

    pub fn add_type_id(&mut self, type_id: Uuid) {
        push_unique(&mut self.type_ids, type_id);
    }

    pub fn add_thing_id(&mut self, thing_id: ThingId) {
        push_unique(&mut self.thing_ids, thing_id);
    }

    pub fn add_value(&mut self, value: impl Into<LogValue>) {
        push_unique(&mut self.values, value.into());
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn time_ranges(&self) -> &[TimeRange] {
        &self.time_ranges
    }

    pub fn sources(&self) -> &[LoggingSource] {
        &self.sources
    }

    pub fn levels(&self) -> &[LoggingLevel] {
        &self.levels
    }

    pub fn event_types(&self) -> &[LoggingEventType] {
        &self.event_types
    }

    pub fn type_ids(&self) -> &[Uuid] {
        &self.type_ids
    }

    pub fn thing_ids(&self) -> &[ThingId] {
        &self.thing_ids
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True when no selection criteria are set
    pub fn is_empty(&self) -> bool {
        self.time_ranges.is_empty()
            && self.sources.is_empty()
            && self.levels.is_empty()
            && self.event_types.is_empty()
            && self.type_ids.is_empty()
            && self.thing_ids.is_empty()
            && self.values.is_empty()
    }

    /// Serialized values bound to the `?` placeholders of [`Self::query_string`], in order
    pub fn values(&self) -> Vec<String> {
        self.values.iter().map(serialize_value).collect()
    }

    /// WHERE clause body without the `WHERE` keyword, or `""` for an empty filter
    pub fn query_string(&self) -> String {
        self.query_string_at(Utc::now())
    }

    pub(crate) fn query_string_at(&self, now: DateTime<Utc>) -> String {
        if self.is_empty() {
            return String::new();
        }

        let now = now.timestamp();
        let conditions = [
            or_group(&self.time_ranges, |range| match (range.start, range.end) {
                (Some(start), Some(end)) => format!(
                    "timestamp BETWEEN {} AND {}",
                    start.timestamp(),
                    end.timestamp()
                ),
                (Some(start), None) => {
                    format!("timestamp BETWEEN {} AND {}", start.timestamp(), now)
                }
                (None, Some(end)) => {
                    format!("timestamp NOT BETWEEN {} AND {}", end.timestamp(), now)
                }
                (None, None) => "1 = 1".to_string(),
            }),
            or_group(&self.sources, |s| format!("sourceType = {}", s.as_i64())),
            or_group(&self.levels, |l| format!("loggingLevel = {}", l.as_i64())),
            or_group(&self.event_types, |e| {
                format!("loggingEventType = {}", e.as_i64())
            }),
            or_group(&self.type_ids, |id| format!("typeId = '{}'", id)),
            or_group(&self.thing_ids, |id| format!("deviceId = '{}'", id)),
            or_group(&self.values, |_| "value = ?".to_string()),
        ];

        conditions.into_iter().flatten().collect::<Vec<_>>().join(" AND ")
    }

    /// `LIMIT`/`OFFSET` suffix, empty when neither is set.
    ///
    /// Counts beyond SQLite's signed 64-bit range are clamped to it.
    pub fn limit_clause(&self) -> String {
        let limit = self.limit.map(sql_count);
        match (limit, sql_count(self.offset)) {
            (None, 0) => String::new(),
            (None, offset) => format!(" LIMIT -1 OFFSET {}", offset),
            (Some(limit), 0) => format!(" LIMIT {}", limit),
            (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
        }
    }
}

fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_empty_filter() {
        let mut filter = LogFilter::new();
        filter.set_limit(Some(10));
        filter.set_offset(5);

        assert!(filter.is_empty());
        assert_eq!(filter.query_string(), "");
        assert!(filter.values().is_empty());
    }

    #[test]
    fn test_single_criterion_is_bare() {
        let mut filter = LogFilter::new();
        filter.add_logging_source(LoggingSource::Actions);
        assert_eq!(filter.query_string(), "sourceType = 2");
    }

    #[test]
    fn test_categories_in_fixed_order() {
        let thing = ThingId(Uuid::parse_str("6a7c4f10-7c3d-4b0c-9bde-1f7d1b4f3a11").unwrap());
        let mut filter = LogFilter::new();
        filter.add_thing_id(thing);
        filter.add_logging_level(LoggingLevel::Alert);
        filter.add_logging_source(LoggingSource::Events);
        filter.add_logging_source(LoggingSource::States);

        assert_eq!(
            filter.query_string(),
            "(sourceType = 1 OR sourceType = 3) AND loggingLevel = 1 \
             AND deviceId = '6a7c4f10-7c3d-4b0c-9bde-1f7d1b4f3a11'"
        );
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut filter = LogFilter::new();
        filter.add_logging_event_type(LoggingEventType::Trigger);
        filter.add_logging_event_type(LoggingEventType::Trigger);
        assert_eq!(filter.event_types().len(), 1);
        assert_eq!(filter.query_string(), "loggingEventType = 0");
    }

    #[test]
    fn test_time_ranges() {
        let now = at(1_000);

        let mut filter = LogFilter::new();
        filter.add_time_filter(Some(at(100)), None);
        assert_eq!(filter.query_string_at(now), "timestamp BETWEEN 100 AND 1000");

        let mut filter = LogFilter::new();
        filter.add_time_filter(None, Some(at(200)));
        assert_eq!(
            filter.query_string_at(now),
            "timestamp NOT BETWEEN 200 AND 1000"
        );

        let mut filter = LogFilter::new();
        filter.add_time_filter(Some(at(100)), Some(at(200)));
        filter.add_time_filter(Some(at(300)), Some(at(400)));
        assert_eq!(
            filter.query_string_at(now),
            "(timestamp BETWEEN 100 AND 200 OR timestamp BETWEEN 300 AND 400)"
        );
    }

    #[test]
    fn test_unbounded_time_range_is_ignored() {
        let mut filter = LogFilter::new();
        filter.add_time_filter(None, None);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_values_are_bound() {
        let mut filter = LogFilter::new();
        filter.add_value(42);
        filter.add_value("on");

        assert_eq!(filter.query_string(), "(value = ? OR value = ?)");
        assert_eq!(
            filter.values(),
            vec![
                serialize_value(&LogValue::Int(42)),
                serialize_value(&LogValue::String("on".to_string()))
            ]
        );
    }

    #[test]
    fn test_limit_clause() {
        let mut filter = LogFilter::new();
        assert_eq!(filter.limit_clause(), "");

        filter.set_offset(20);
        assert_eq!(filter.limit_clause(), " LIMIT -1 OFFSET 20");

        filter.set_limit(Some(10));
        assert_eq!(filter.limit_clause(), " LIMIT 10 OFFSET 20");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_limit_clause_clamps_huge_counts() {
        let mut filter = LogFilter::new();
        filter.set_limit(Some(usize::MAX));
        filter.set_offset(usize::MAX);

        let clause = filter.limit_clause();
        assert_eq!(clause, format!(" LIMIT {} OFFSET {}", i64::MAX, i64::MAX));
    }
}
