//! Lenient number parsing for conversational answers
//!
//! Users answer "5-6", "about 7", "8 out of 10" or "maybe 4 or 5". These
//! helpers turn such answers into a single number. Imperial heights such as
//! `5'7` are rejected rather than misread.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"));

static FEET_INCHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d\s*['’]\s*\d").expect("feet pattern is valid"));

/// First number appearing anywhere in the text
pub fn extract_first_number(text: &str) -> Option<f64> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn mean_of_parts<'a>(parts: impl Iterator<Item = &'a str>) -> Option<f64> {
    let nums: Vec<f64> = parts.filter_map(extract_first_number).collect();
    if nums.is_empty() {
        None
    } else {
        Some(nums.iter().sum::<f64>() / nums.len() as f64)
    }
}

/// Parse a free-text answer into a float.
///
/// Rules, applied in order: "X out of Y" keeps X; "X or Y" and "X to Y"
/// average; "X/Y" keeps X; "X-Y" averages; otherwise the first number.
pub fn parse_float(text: &str) -> Option<f64> {
    let mut s = text.trim().to_lowercase();

    if FEET_INCHES.is_match(&s) {
        return None;
    }

    if let Some((head, _)) = s.split_once(" out of ") {
        s = head.trim().to_string();
    }

    for separator in [" or ", " to "] {
        if s.contains(separator) {
            if let Some(mean) = mean_of_parts(s.split(separator)) {
                return Some(mean);
            }
        }
    }

    if let Some((head, _)) = s.split_once('/') {
        s = head.trim().to_string();
    }

    if s.contains('-') && !s.starts_with('-') {
        if let Some(mean) = mean_of_parts(s.split('-')) {
            return Some(mean);
        }
    }

    extract_first_number(&s)
}

/// Parse a free-text answer into a whole number, rounding half away from zero
pub fn parse_int(text: &str) -> Option<u32> {
    parse_float(text).map(|v| v.round() as u32)
}

/// Numeric reading of a JSON value the model extracted
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float(s),
        _ => None,
    }
}

pub fn value_as_u32(value: &Value) -> Option<u32> {
    value_as_f64(value)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// yes/no reading of a JSON value
pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "1" => Some(true),
            "no" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Trimmed, non-empty string reading of a JSON value
pub fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
