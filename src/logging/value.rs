//! Typed values carried by log entries
//!
//! Values are persisted as tagged JSON text so that the original type
//! survives a round trip through the `value` column. Legacy rows that hold
//! bare text decode as [`LogValue::String`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A dynamically typed value attached to a log entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum LogValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(#[serde(with = "double")] f64),
    String(String),
    Uuid(Uuid),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Color {
        red: u8,
        green: u8,
        blue: u8,
        alpha: u8,
    },
    List(Vec<LogValue>),
    Map(BTreeMap<String, LogValue>),
}

impl LogValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LogValue::Null)
    }

    /// Interpret user input: booleans, integers and floats keep their type,
    /// anything else is a string
    pub fn parse_literal(text: &str) -> Self {
        if let Ok(b) = text.parse::<bool>() {
            return LogValue::Bool(b);
        }
        if let Ok(i) = text.parse::<i64>() {
            return LogValue::Int(i);
        }
        if let Ok(d) = text.parse::<f64>() {
            if d.is_finite() {
                return LogValue::Double(d);
            }
        }
        LogValue::String(text.to_string())
    }

    /// Human readable rendering used by the CLI and text output
    pub fn to_display_string(&self) -> String {
        match self {
            LogValue::Null => String::new(),
            LogValue::Bool(b) => b.to_string(),
            LogValue::Int(i) => i.to_string(),
            LogValue::Double(d) => d.to_string(),
            LogValue::String(s) => s.clone(),
            LogValue::Uuid(u) => u.to_string(),
            LogValue::Bytes(bytes) => STANDARD.encode(bytes),
            LogValue::Color {
                red,
                green,
                blue,
                alpha,
            } => {
                if *alpha == u8::MAX {
                    format!("#{:02x}{:02x}{:02x}", red, green, blue)
                } else {
                    format!("#{:02x}{:02x}{:02x}{:02x}", alpha, red, green, blue)
                }
            }
            LogValue::List(items) => items
                .iter()
                .map(LogValue::to_display_string)
                .collect::<Vec<_>>()
                .join(", "),
            LogValue::Map(map) => {
                let inner = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_display_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", inner)
            }
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Encode a value into the text stored in the `value` column.
///
/// Null is stored as the empty string.
pub fn serialize_value(value: &LogValue) -> String {
    if value.is_null() {
        return String::new();
    }
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize log value, storing display form");
            value.to_display_string()
        }
    }
}

/// Decode the text stored in the `value` column.
///
/// Anything that is not a tagged value written by [`serialize_value`] is
/// returned as a plain string.
pub fn deserialize_value(text: &str) -> LogValue {
    if text.is_empty() {
        return LogValue::Null;
    }
    match serde_json::from_str::<LogValue>(text) {
        Ok(value) => value,
        Err(_) => LogValue::String(text.to_string()),
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// JSON has no NaN or infinity, so those are written as tagged strings
mod double {
    use super::*;
    use serde::de::{self, Visitor};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(DoubleVisitor)
    }

    struct DoubleVisitor;

    impl<'de> Visitor<'de> for DoubleVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"inf\" or \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }

        // Rows written by older releases stored non-finite doubles as null
        fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
            Ok(f64::NAN)
        }
    }
}

impl From<bool> for LogValue {
    fn from(value: bool) -> Self {
        LogValue::Bool(value)
    }
}

impl From<i32> for LogValue {
    fn from(value: i32) -> Self {
        LogValue::Int(value.into())
    }
}

impl From<i64> for LogValue {
    fn from(value: i64) -> Self {
        LogValue::Int(value)
    }
}

impl From<u32> for LogValue {
    fn from(value: u32) -> Self {
        LogValue::Int(value.into())
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Double(value)
    }
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::String(value.to_string())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::String(value)
    }
}

impl From<Uuid> for LogValue {
    fn from(value: Uuid) -> Self {
        LogValue::Uuid(value)
    }
}

impl From<Vec<LogValue>> for LogValue {
    fn from(value: Vec<LogValue>) -> Self {
        LogValue::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_keeps_its_type() {
        let text = serialize_value(&LogValue::Int(42));
        assert_eq!(deserialize_value(&text), LogValue::Int(42));
        assert_ne!(deserialize_value(&text), LogValue::String("42".to_string()));
    }

    #[test]
    fn test_null_is_empty_text() {
        assert_eq!(serialize_value(&LogValue::Null), "");
        assert_eq!(deserialize_value(""), LogValue::Null);
    }

    #[test]
    fn test_legacy_text_decodes_as_string() {
        assert_eq!(
            deserialize_value("on"),
            LogValue::String("on".to_string())
        );
        // JSON that is not one of our tagged values is still just text
        assert_eq!(
            deserialize_value("{\"foo\":1}"),
            LogValue::String("{\"foo\":1}".to_string())
        );
    }

    #[test]
    fn test_nested_values() {
        let mut map = BTreeMap::new();
        map.insert("temperature".to_string(), LogValue::Double(21.5));
        map.insert("raw".to_string(), LogValue::Bytes(vec![0, 1, 254]));
        let value = LogValue::List(vec![LogValue::Bool(true), LogValue::Map(map)]);

        assert_eq!(deserialize_value(&serialize_value(&value)), value);
    }

    #[test]
    fn test_non_finite_doubles_keep_their_type() {
        let nan = deserialize_value(&serialize_value(&LogValue::Double(f64::NAN)));
        assert!(matches!(nan, LogValue::Double(d) if d.is_nan()));

        for value in [f64::INFINITY, f64::NEG_INFINITY, 21.5, 0.0] {
            let text = serialize_value(&LogValue::Double(value));
            assert_eq!(deserialize_value(&text), LogValue::Double(value));
        }

        assert_eq!(
            serialize_value(&LogValue::Double(f64::NEG_INFINITY)),
            "{\"type\":\"double\",\"value\":\"-inf\"}"
        );
    }

    #[test]
    fn test_null_double_from_older_rows_is_nan() {
        let value = deserialize_value("{\"type\":\"double\",\"value\":null}");
        assert!(matches!(value, LogValue::Double(d) if d.is_nan()));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(LogValue::parse_literal("42"), LogValue::Int(42));
        assert_eq!(LogValue::parse_literal("true"), LogValue::Bool(true));
        assert_eq!(LogValue::parse_literal("21.5"), LogValue::Double(21.5));
        assert_eq!(LogValue::parse_literal("nan"), LogValue::String("nan".to_string()));
        assert_eq!(LogValue::parse_literal("on"), LogValue::String("on".to_string()));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(LogValue::Int(7).to_display_string(), "7");
        assert_eq!(
            LogValue::List(vec!["a".into(), 1.into()]).to_display_string(),
            "a, 1"
        );
        let red = LogValue::Color {
            red: 255,
            green: 0,
            blue: 0,
            alpha: 255,
        };
        assert_eq!(red.to_display_string(), "#ff0000");
    }
}
