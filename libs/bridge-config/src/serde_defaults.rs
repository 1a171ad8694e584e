//! Serde default value functions and custom deserializers for configuration structs
//!
//! This module provides centralized default value functions used by serde's
//! `#[serde(default = "...")]` attribute across the configuration model.

use serde::de::{self, Deserializer};
use serde::Deserialize;

// ============================================================================
// Default Value Functions
// ============================================================================

/// Default soft upper travel limit in millimetres
pub fn axis_max_value() -> f64 {
    40.0
}

/// Default soft lower travel limit in millimetres
pub fn axis_min_value() -> f64 {
    -20.0
}

/// Default host display label (the "Encoder Z" field on the host settings page)
pub fn display_label() -> u32 {
    31
}

/// Default multiplier applied to positions shown in the host display label
pub fn display_multiplier() -> u32 {
    10_000
}

pub fn init_macro() -> String {
    "M4".to_string()
}

pub fn close_port_macro() -> String {
    "M5".to_string()
}

pub fn move_macro() -> String {
    "M3".to_string()
}

/// Every letter the host treats as an axis word, replaced or not
pub fn axis_alphabet() -> String {
    "XYZABCS".to_string()
}

/// Output line terminator of the converted program
pub fn line_terminator() -> String {
    "\r\n".to_string()
}

pub fn port_name() -> String {
    "COM3".to_string()
}

pub fn baud_rate() -> u32 {
    9600
}

pub fn log_folder() -> std::path::PathBuf {
    std::path::PathBuf::from("logs")
}

pub fn line_settings() -> String {
    "8-1-N".to_string()
}

pub fn read_timeout_ms() -> u64 {
    100
}

pub fn write_timeout_ms() -> u64 {
    1000
}

/// Wait budget for SETAXIS / GETPOS / STOP / SETJS exchanges
pub fn command_timeout_ms() -> u64 {
    5000
}

pub fn input_buffer_size() -> usize {
    256
}

pub fn queue_poll_interval_ms() -> u64 {
    25
}

/// Floor for the per-move position notification staleness budget
pub fn min_move_notify_timeout_ms() -> u64 {
    3000
}

// ============================================================================
// Custom Deserializers
// ============================================================================

/// Custom deserializer for boolean fields that supports multiple input formats
///
/// - boolean: true, false
/// - integer: 0 (false), 1 (true)
/// - string: "1"/"0", "true"/"false", "yes"/"no" (case-insensitive)
pub fn deserialize_bool_flexible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrStringOrInt {
        Bool(bool),
        Int(i64),
        String(String),
    }

    match BoolOrStringOrInt::deserialize(deserializer)? {
        BoolOrStringOrInt::Bool(b) => Ok(b),
        BoolOrStringOrInt::Int(i) => match i {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(de::Error::custom(format!(
                "Invalid integer value {}, expected 0 or 1",
                i
            ))),
        },
        BoolOrStringOrInt::String(s) => match s.to_lowercase().trim() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(de::Error::custom(format!(
                "Invalid boolean value '{}', expected: 1/0, true/false, yes/no, or boolean",
                other
            ))),
        },
    }
}

/// Accept either a `;`-separated string or a list of strings; empty items are dropped
pub fn deserialize_semicolon_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        String(String),
        List(Vec<String>),
    }

    let items = match StringOrList::deserialize(deserializer)? {
        StringOrList::String(s) => s.split(';').map(str::to_string).collect::<Vec<_>>(),
        StringOrList::List(list) => list,
    };

    Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Flags {
        #[serde(deserialize_with = "deserialize_bool_flexible")]
        disabled: bool,
        #[serde(deserialize_with = "deserialize_semicolon_list")]
        macros: Vec<String>,
    }

    #[test]
    fn test_bool_flexible_and_semicolon_list() {
        let flags: Flags =
            serde_json::from_str(r#"{"disabled": "yes", "macros": "M98;;M6;"}"#).unwrap();
        assert!(flags.disabled);
        assert_eq!(flags.macros, vec!["M98", "M6"]);

        let flags: Flags =
            serde_json::from_str(r#"{"disabled": 0, "macros": ["M98", ""]}"#).unwrap();
        assert!(!flags.disabled);
        assert_eq!(flags.macros, vec!["M98"]);
    }

    #[test]
    fn test_bool_flexible_rejects_garbage() {
        let err = serde_json::from_str::<Flags>(r#"{"disabled": 7, "macros": ""}"#).unwrap_err();
        assert!(err.to_string().contains("expected 0 or 1"));
    }
}
