//! COPY line formatting
//!
//! Turns a validated row back into one CSV line for the Postgres COPY
//! stream: `provider,eventId,timestamp,data\n` with standard quoting.

use std::borrow::Cow;

use super::ValidatedRow;

/// Serialize one row as a CSV line, newline included.
pub fn format_row(row: &ValidatedRow) -> String {
    format!(
        "{},{},{},{}\n",
        escape(&row.provider),
        escape(&row.event_id),
        escape(&row.timestamp),
        escape(&row.data),
    )
}

/// Wrap in quotes and double internal quotes when the value contains a
/// delimiter, quote, or line break.
fn escape(value: &str) -> Cow<'_, str> {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
