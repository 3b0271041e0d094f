//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Fetching a practice exercise with recent history attached
//!   - Recording answered exercises (and surfacing milestone signals)
//!   - Filtered history reports and CSV export
//!   - Persisting exam settings and the placement recommendation

use tracing::{info, instrument};

use crate::content::MAX_RECENT_SENTENCES;
use crate::domain::{ExamSettings, HistoryItem, Level, Question, Skill};
use crate::error::AppError;
use crate::export::history_csv;
use crate::history::{aggregate, daily, share_text, HistoryFilter, Milestone};
use crate::protocol::HistoryOut;
use crate::state::AppState;
use crate::util::trunc_for_log;

/// Ask the content source for one exercise, passing the most recent
/// practiced sentences so it can avoid repeating them.
#[instrument(level = "info", skip_all, fields(%level, skill = skill.label()))]
pub async fn next_exercise(state: &AppState, level: Level, skill: Skill) -> Result<Question, AppError> {
  let recent = state.history.read().await.recent_sentences(MAX_RECENT_SENTENCES);
  let q = state.content.fetch_exercise(level, skill, &recent).await?;
  info!(target: "practice", %level, sentence = %trunc_for_log(&q.sentence, 60), "Exercise served");
  Ok(q)
}

#[instrument(level = "info", skip_all, fields(%level))]
pub async fn record_answer(
  state: &AppState,
  level: Level,
  exercise: Question,
  selected: String,
) -> (HistoryItem, Option<Milestone>) {
  let (item, milestone) = state.history.write().await.record(level, exercise, selected);
  info!(target: "practice", %level, correct = item.is_correct, "Answer recorded");
  (item, milestone)
}

pub async fn history_report(state: &AppState, filter: &HistoryFilter) -> HistoryOut {
  let history = state.history.read().await;
  let items = filter.apply(history.items());
  let stats = aggregate(&items);
  HistoryOut {
    daily: daily(&items),
    share_text: share_text(&stats),
    stats,
    total: history.len(),
    items,
  }
}

/// CSV for the filtered history; None when there is nothing to export.
pub async fn history_export(state: &AppState, filter: &HistoryFilter) -> Option<String> {
  let history = state.history.read().await;
  history_csv(&filter.apply(history.items()))
}

pub async fn save_exam_settings(state: &AppState, settings: ExamSettings) -> Result<ExamSettings, AppError> {
  let mut prefs = state.prefs.write().await;
  prefs.set_exam_settings(settings)?;
  Ok(prefs.exam_settings())
}

pub async fn save_recommendation(state: &AppState, level: Level) {
  state.prefs.write().await.set_recommended_level(level);
  info!(target: "exam", %level, "Recommended level saved");
}
