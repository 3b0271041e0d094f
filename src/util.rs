//! Small utility helpers used across modules.

use chrono::Utc;

use crate::domain::BLANK_MARKER;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Sentence as shown to the learner, with the blank marker drawn as a line.
pub fn display_sentence(sentence: &str) -> String {
  sentence.replacen(BLANK_MARKER, "______", 1)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}
