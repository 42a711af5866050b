//! Value utility functions shared across modules
//!
//! Records are schemaless, so numeric and id fields arrive as whatever the
//! caller stored: integers, floats, or numeric strings. These helpers coerce
//! them consistently, and provide the locale-aware string ordering used when
//! presenting product names.

use serde_json::Value;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Interpret a value as an integer id.
///
/// Accepts integers, integral floats and strings holding an integer.
pub fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret a value as a number, zero when it is not numeric.
pub fn as_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Convert an f64 back into a JSON number, keeping integers integral.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

// ============================================================================
// COLLATION
// ============================================================================

/// Primary letter weight for Spanish collation: base letter, case and
/// accents folded, with `ñ` kept as its own letter after `n`.
fn primary_key(s: &str) -> Vec<(char, u8)> {
    let mut key = Vec::with_capacity(s.len());
    let mut chars = s.nfd().peekable();
    while let Some(c) = chars.next() {
        if is_combining_mark(c) {
            continue;
        }
        let lower = c.to_lowercase().next().unwrap_or(c);
        if lower == 'n' && chars.peek() == Some(&'\u{0303}') {
            chars.next();
            key.push(('n', 1));
        } else {
            key.push((lower, 0));
        }
    }
    key
}

/// Accent marks in order of appearance (secondary weight).
fn secondary_key(s: &str) -> Vec<char> {
    s.nfd().filter(|c| is_combining_mark(*c) && *c != '\u{0303}').collect()
}

/// Case pattern: lowercase sorts before uppercase (tertiary weight).
fn tertiary_key(s: &str) -> Vec<bool> {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(char::is_uppercase)
        .collect()
}

/// Compare two display strings the way a Spanish-locale collator does.
///
/// Base letters decide first ("árbol" < "Avena" < "Ñandú" < "Oca"); only
/// when they tie do accents and then case break the tie ("pan" < "Pan" <
/// "pán"). Byte order is the last resort so the result is total.
pub fn compare_locale(a: &str, b: &str) -> Ordering {
    primary_key(a)
        .cmp(&primary_key(b))
        .then_with(|| secondary_key(a).cmp(&secondary_key(b)))
        .then_with(|| tertiary_key(a).cmp(&tertiary_key(b)))
        .then_with(|| a.cmp(b))
}
