//! Log entries and their classification enums
//!
//! The integer discriminants below are what ends up in the `entries` table.
//! They are fixed explicitly and must never be renumbered.

use crate::logging::error::LogEngineError;
use crate::logging::types::ThingId;
use crate::logging::value::LogValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! stored_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident = $value:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Integer stored in the database
            pub fn as_i64(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            /// Name stored in the lookup table
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl TryFrom<i64> for $name {
            type Error = LogEngineError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(LogEngineError::InvalidDiscriminant { kind: $kind, value }),
                }
            }
        }

        impl FromStr for $name {
            type Err = LogEngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(s)
                        || v.name().trim_start_matches($kind).eq_ignore_ascii_case(s))
                    .ok_or_else(|| LogEngineError::UnknownName { kind: $kind, name: s.to_string() })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

stored_enum! {
    /// Severity of an entry
    LoggingLevel, "LoggingLevel" {
        Info = 0 => "LoggingLevelInfo",
        Alert = 1 => "LoggingLevelAlert",
    }
}

stored_enum! {
    /// What produced an entry
    LoggingSource, "LoggingSource" {
        System = 0 => "LoggingSourceSystem",
        Events = 1 => "LoggingSourceEvents",
        Actions = 2 => "LoggingSourceActions",
        States = 3 => "LoggingSourceStates",
        Rules = 4 => "LoggingSourceRules",
        BrowserActions = 5 => "LoggingSourceBrowserActions",
    }
}

stored_enum! {
    /// How an entry should be interpreted
    LoggingEventType, "LoggingEventType" {
        Trigger = 0 => "LoggingEventTypeTrigger",
        ActiveChange = 1 => "LoggingEventTypeActiveChange",
        EnabledChange = 2 => "LoggingEventTypeEnabledChange",
        ActionsExecuted = 3 => "LoggingEventTypeActionsExecuted",
        ExitActionsExecuted = 4 => "LoggingEventTypeExitActionsExecuted",
    }
}

/// One logged occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LoggingLevel,
    pub source: LoggingSource,
    pub event_type: LoggingEventType,
    /// Event, state, action or rule id depending on `source`
    pub type_id: Uuid,
    pub thing_id: ThingId,
    pub value: LogValue,
    pub active: bool,
    /// Only meaningful for [`LoggingLevel::Alert`]
    pub error_code: i32,
}

impl LogEntry {
    /// New Info/Trigger entry stamped with the current time.
    ///
    /// The timestamp is truncated to whole seconds, the resolution the
    /// database keeps.
    pub fn new(source: LoggingSource) -> Self {
        Self::at(Utc::now(), source)
    }

    pub fn at(timestamp: DateTime<Utc>, source: LoggingSource) -> Self {
        Self {
            timestamp: truncate_to_seconds(timestamp),
            level: LoggingLevel::Info,
            source,
            event_type: LoggingEventType::Trigger,
            type_id: Uuid::nil(),
            thing_id: ThingId::nil(),
            value: LogValue::Null,
            active: false,
            error_code: 0,
        }
    }

    pub fn with_level(mut self, level: LoggingLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_event_type(mut self, event_type: LoggingEventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_type_id(mut self, type_id: Uuid) -> Self {
        self.type_id = type_id;
        self
    }

    pub fn with_thing_id(mut self, thing_id: ThingId) -> Self {
        self.thing_id = thing_id;
        self
    }

    pub fn with_value(mut self, value: impl Into<LogValue>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogEntry({} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.source,
            self.level,
            self.event_type
        )?;
        if !self.type_id.is_nil() {
            write!(f, " type={}", self.type_id)?;
        }
        if !self.thing_id.is_nil() {
            write!(f, " thing={}", self.thing_id)?;
        }
        if !self.value.is_null() {
            write!(f, " value={}", self.value)?;
        }
        if matches!(
            self.event_type,
            LoggingEventType::ActiveChange | LoggingEventType::EnabledChange
        ) {
            write!(f, " active={}", self.active)?;
        }
        if self.level == LoggingLevel::Alert {
            write!(f, " error={}", self.error_code)?;
        }
        f.write_str(")")
    }
}

pub(crate) fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_are_stable() {
        assert_eq!(LoggingLevel::Alert.as_i64(), 1);
        assert_eq!(LoggingSource::BrowserActions.as_i64(), 5);
        assert_eq!(LoggingEventType::ExitActionsExecuted.as_i64(), 4);
        assert_eq!(LoggingSource::try_from(3).unwrap(), LoggingSource::States);
    }

    #[test]
    fn test_unknown_discriminant_is_rejected() {
        let err = LoggingSource::try_from(42).unwrap_err();
        assert!(matches!(
            err,
            LogEngineError::InvalidDiscriminant { kind: "LoggingSource", value: 42 }
        ));
    }

    #[test]
    fn test_parse_short_and_full_names() {
        assert_eq!("events".parse::<LoggingSource>().unwrap(), LoggingSource::Events);
        assert_eq!(
            "LoggingSourceRules".parse::<LoggingSource>().unwrap(),
            LoggingSource::Rules
        );
        assert_eq!("alert".parse::<LoggingLevel>().unwrap(), LoggingLevel::Alert);
        assert!("nope".parse::<LoggingEventType>().is_err());
    }

    #[test]
    fn test_new_entry_has_whole_seconds() {
        let entry = LogEntry::new(LoggingSource::System);
        assert_eq!(entry.timestamp.timestamp_subsec_nanos(), 0);
        assert_eq!(entry.level, LoggingLevel::Info);
        assert!(entry.thing_id.is_nil());
    }
}
