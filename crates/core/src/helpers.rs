//! Helper functions for text normalization and literal formatting.

use serde_json::{Number, Value};

/// Normalize a raw utterance for a single-line record.
///
/// Embedded newlines become spaces and surrounding whitespace is trimmed.
pub fn clean_utterance(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// Join displayable items with `", "`.
pub fn comma_join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a string the way a Python `repr()` does.
///
/// Single quotes are preferred; double quotes are used when the text contains
/// a single quote but no double quote.
pub fn python_repr_str(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = c as u32;
                if code < 0x100 {
                    out.push_str(&format!("\\x{:02x}", code));
                } else {
                    out.push_str(&format!("\\u{:04x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Render a list of strings as a Python list literal, e.g. `['XXL', 'S']`.
pub fn python_list_literal(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|s| python_repr_str(s)).collect();
    format!("[{}]", inner.join(", "))
}

/// Render a JSON number the way Python's `str()` renders the parsed value.
pub fn python_number_text(number: &Number) -> String {
    if let Some(i) = number.as_i64() {
        return i.to_string();
    }
    if let Some(u) = number.as_u64() {
        return u.to_string();
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 => format!("{:.1}", f),
        Some(f) => f.to_string(),
        None => number.to_string(),
    }
}

/// Render a non-container JSON scalar as Python's `str()` would.
///
/// Returns `None` for arrays and objects.
pub fn python_scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(python_number_text(n)),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null => Some("None".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
