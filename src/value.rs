//! Helpers over candidate field values.
//!
//! Candidate values arrive from the extraction pipeline as arbitrary JSON.
//! The classifier and strategies only need a handful of views onto them:
//! a comparable string form, a numeric reading, and a JSON-type check.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

static NUMERIC_TEXT: OnceLock<Regex> = OnceLock::new();

fn numeric_text() -> &'static Regex {
    NUMERIC_TEXT.get_or_init(|| {
        // Optional sign, optional currency symbol, digits with optional
        // thousands separators, optional fraction.
        Regex::new(r"^([+-])?\s*[$€£¥]?\s*((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)$")
            .expect("numeric text regex is valid")
    })
}

/// Renders a value the way it is compared for equality.
///
/// Strings are taken verbatim, numbers and booleans use their JSON text,
/// `null` is the empty string and containers use compact JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Case-insensitive equality of the stringified forms.
#[must_use]
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    stringify(a).to_lowercase() == stringify(b).to_lowercase()
}

/// True if the underlying JSON value is a number.
///
/// Numeric *strings* are not numeric here; they only count for
/// [`parse_number`].
#[must_use]
pub const fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_))
}

/// True if the underlying JSON value is a string.
#[must_use]
pub const fn is_text(value: &Value) -> bool {
    matches!(value, Value::String(_))
}

/// Reads a value as a finite `f64`.
///
/// Accepts JSON numbers and numeric strings, including strings with a
/// currency symbol or thousands separators (`"$1,250.00"`).
#[must_use]
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_text(s),
        _ => None,
    }
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = trimmed.parse::<f64>() {
        return parsed.is_finite().then_some(parsed);
    }

    let caps = numeric_text().captures(trimmed)?;
    let digits = caps.get(2)?.as_str().replace(',', "");
    let magnitude = digits.parse::<f64>().ok()?;
    let signed = match caps.get(1).map(|m| m.as_str()) {
        Some("-") => -magnitude,
        _ => magnitude,
    };
    signed.is_finite().then_some(signed)
}

/// Rounds to a fixed number of decimal places.
///
/// Values too large to scale without overflowing are returned unrounded.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stringify_renders_scalars() {
        assert_eq!(stringify(&json!("Acme")), "Acme");
        assert_eq!(stringify(&json!(125000)), "125000");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&Value::Null), "");
    }

    #[test]
    fn loosely_equal_ignores_case() {
        assert!(loosely_equal(&json!("ACME Corp"), &json!("acme corp")));
        assert!(!loosely_equal(&json!("acme"), &json!("acme ")));
    }

    #[test]
    fn number_and_numeric_string_compare_equal() {
        assert!(loosely_equal(&json!(100), &json!("100")));
    }

    #[test]
    fn parse_number_accepts_formatted_text() {
        assert_eq!(parse_number(&json!("125000")), Some(125_000.0));
        assert_eq!(parse_number(&json!("$1,250.50")), Some(1250.5));
        assert_eq!(parse_number(&json!("-3.5")), Some(-3.5));
        assert_eq!(parse_number(&json!(" 42 ")), Some(42.0));
        assert_eq!(parse_number(&json!(7.25)), Some(7.25));
    }

    #[test]
    fn parse_number_rejects_non_numeric() {
        assert_eq!(parse_number(&json!("n/a")), None);
        assert_eq!(parse_number(&json!("inf")), None);
        assert_eq!(parse_number(&json!("1,25")), None);
        assert_eq!(parse_number(&json!(true)), None);
        assert_eq!(parse_number(&Value::Null), None);
    }

    #[test]
    fn round_to_two_places() {
        assert!((round_to(123_456.789, 2) - 123_456.79).abs() < f64::EPSILON);
        assert!((round_to(0.125, 1) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn round_to_keeps_huge_values_finite() {
        assert_eq!(round_to(1.05e307, 2), 1.05e307);
        assert_eq!(round_to(-f64::MAX, 2), -f64::MAX);
    }
}
