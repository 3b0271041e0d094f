//! CSV export of (filtered) practice history.

use chrono::DateTime;

use crate::domain::HistoryItem;
use crate::util::display_sentence;

pub const EXPORT_FILENAME: &str = "historial_practica.csv";

pub const CSV_HEADERS: [&str; 7] = [
  "Date",
  "Level",
  "Question",
  "YourAnswer",
  "CorrectAnswer",
  "Result",
  "Explanation",
];

/// Render items as CSV. Returns None for an empty list: nothing to export.
pub fn history_csv(items: &[HistoryItem]) -> Option<String> {
  if items.is_empty() {
    return None;
  }
  let mut lines = Vec::with_capacity(items.len() + 1);
  lines.push(CSV_HEADERS.join(","));
  for item in items {
    let row = [
      format_timestamp(item.timestamp),
      item.level.to_string(),
      display_sentence(&item.exercise.sentence),
      item.selected_answer.clone(),
      item.exercise.correct_answer.clone(),
      if item.is_correct { "Correct" } else { "Incorrect" }.to_string(),
      item.exercise.explanation.clone(),
    ];
    lines.push(row.iter().map(|f| escape_field(f)).collect::<Vec<_>>().join(","));
  }
  Some(lines.join("\n"))
}

/// Quote a field containing a comma, quote or newline; inner quotes doubled.
pub fn escape_field(field: &str) -> String {
  if field.contains([',', '"', '\n']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

fn format_timestamp(ts: i64) -> String {
  DateTime::from_timestamp_millis(ts)
    .map(|dt| dt.format("%d/%m/%Y %H:%M").to_string())
    .unwrap_or_default()
}
