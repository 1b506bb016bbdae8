#![forbid(unsafe_code)]

//! Cell and summary formatting for the text output.

use qgrid_core::ColumnType;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Default cell width before truncation.
pub const MAX_CELL_CHARS: usize = 50;

/// `850ms`, `2.3s`.
#[must_use]
pub fn format_execution_time(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1_000.0)
    }
}

/// Integer with thousands separators: `25,000`.
#[must_use]
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Cut `s` to `max_chars` characters, appending `...` when anything was cut.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => format!("{}...", &s[..byte]),
        None => s.to_owned(),
    }
}

/// `[a, b, c, ... +2 more]`.
#[must_use]
pub fn truncate_array(items: &[Value], max_items: usize) -> String {
    let shown: Vec<String> = items.iter().take(max_items).map(plain).collect();
    if items.len() <= max_items {
        format!("[{}]", shown.join(", "))
    } else {
        format!("[{}, ... +{} more]", shown.join(", "), items.len() - max_items)
    }
}

/// Seconds since the Unix epoch as an RFC 3339 UTC timestamp.
#[must_use]
pub fn format_epoch(seconds: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
}

/// Strings unquoted, everything else as compact JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render one cell for display according to its declared column type.
#[must_use]
pub fn format_cell(value: Option<&Value>, column_type: ColumnType) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let text = match (column_type, value) {
        (_, Value::Null) => "null".to_owned(),
        (ColumnType::Epoch, Value::Number(n)) => n
            .as_i64()
            .and_then(format_epoch)
            .unwrap_or_else(|| n.to_string()),
        (ColumnType::Array, Value::Array(items)) => truncate_array(items, 3),
        (_, other) => plain(other),
    };
    truncate(&text, MAX_CELL_CHARS)
}
