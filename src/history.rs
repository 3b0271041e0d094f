//! Practice history: the persisted, most-recent-first log of answered
//! single-practice questions, plus the pure views computed over it
//! (filtering, accuracy, per-day breakdown) and the milestone share signal.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{HistoryItem, Level, Question};
use crate::store::{load_json, save_json, SharedStore, KEY_HISTORY, KEY_MILESTONES};
use crate::util::now_millis;

/// History sizes at which the learner is invited once to share the app.
pub const MILESTONES: [usize; 3] = [3, 10, 25];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Milestone {
  pub count: usize,
  pub message: String,
}

impl Milestone {
  fn new(count: usize) -> Self {
    Self {
      count,
      message: format!(
        "Ja portes {count} exercicis practicats! T'agrada l'app? Ajuda a que més gent la descobreixi i comparteix-la."
      ),
    }
  }
}

pub struct HistoryLog {
  store: SharedStore,
  items: Vec<HistoryItem>,
  shown_milestones: Vec<usize>,
}

impl HistoryLog {
  pub fn load(store: SharedStore) -> Self {
    let items: Vec<HistoryItem> = load_json(store.as_ref(), KEY_HISTORY).unwrap_or_default();
    let shown_milestones: Vec<usize> = load_json(store.as_ref(), KEY_MILESTONES).unwrap_or_default();
    info!(target: "history", items = items.len(), shown = ?shown_milestones, "Practice history loaded");
    Self { store, items, shown_milestones }
  }

  /// Most recent first.
  pub fn items(&self) -> &[HistoryItem] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Build a timestamped item for an answered question and append it.
  pub fn record(
    &mut self,
    level: Level,
    exercise: Question,
    selected_answer: String,
  ) -> (HistoryItem, Option<Milestone>) {
    let is_correct = exercise.is_correct(&selected_answer);
    let item = HistoryItem {
      level,
      exercise,
      selected_answer,
      is_correct,
      timestamp: self.next_timestamp(),
    };
    let milestone = self.append(item.clone());
    (item, milestone)
  }

  /// Prepend an item, persist the log, and report a milestone the first
  /// time the log reaches one of `MILESTONES`.
  pub fn append(&mut self, item: HistoryItem) -> Option<Milestone> {
    self.items.insert(0, item);
    save_json(self.store.as_ref(), KEY_HISTORY, &self.items);
    debug!(target: "history", total = self.items.len(), "History item appended");

    let count = self.items.len();
    if MILESTONES.contains(&count) && !self.shown_milestones.contains(&count) {
      self.shown_milestones.push(count);
      save_json(self.store.as_ref(), KEY_MILESTONES, &self.shown_milestones);
      info!(target: "history", count, "Share milestone reached");
      return Some(Milestone::new(count));
    }
    None
  }

  /// Empty the log. Milestones already shown stay shown.
  pub fn clear(&mut self) {
    self.items.clear();
    save_json(self.store.as_ref(), KEY_HISTORY, &self.items);
    info!(target: "history", "Practice history cleared");
  }

  /// Sentences of the `n` most recent items.
  pub fn recent_sentences(&self, n: usize) -> Vec<String> {
    self.items.iter().take(n).map(|i| i.exercise.sentence.clone()).collect()
  }

  // Creation times must strictly increase even if the clock stalls or steps back.
  fn next_timestamp(&self) -> i64 {
    let now = now_millis();
    match self.items.first() {
      Some(latest) if latest.timestamp >= now => latest.timestamp + 1,
      _ => now,
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFilter {
  #[default]
  All,
  Correct,
  Incorrect,
}

/// Conjunctive filter over history items. `None` fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryFilter {
  pub level: Option<Level>,
  pub result: ResultFilter,
  /// Inclusive, from the start of the day.
  pub from: Option<NaiveDate>,
  /// Inclusive, to the end of the day.
  pub to: Option<NaiveDate>,
}

impl HistoryFilter {
  pub fn is_active(&self) -> bool {
    self.level.is_some() || self.result != ResultFilter::All || self.from.is_some() || self.to.is_some()
  }

  pub fn matches(&self, item: &HistoryItem) -> bool {
    if let Some(level) = self.level {
      if item.level != level {
        return false;
      }
    }
    match self.result {
      ResultFilter::All => {}
      ResultFilter::Correct if !item.is_correct => return false,
      ResultFilter::Incorrect if item.is_correct => return false,
      _ => {}
    }
    if let Some(start) = self.from.and_then(start_of_day_millis) {
      if item.timestamp < start {
        return false;
      }
    }
    if let Some(end) = self.to.and_then(end_of_day_millis) {
      if item.timestamp > end {
        return false;
      }
    }
    true
  }

  pub fn apply(&self, items: &[HistoryItem]) -> Vec<HistoryItem> {
    items.iter().filter(|i| self.matches(i)).cloned().collect()
  }
}

fn start_of_day_millis(d: NaiveDate) -> Option<i64> {
  d.and_hms_milli_opt(0, 0, 0, 0).map(|dt| dt.and_utc().timestamp_millis())
}

fn end_of_day_millis(d: NaiveDate) -> Option<i64> {
  d.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc().timestamp_millis())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub correct_count: usize,
  pub incorrect_count: usize,
  pub accuracy_percent: u32,
}

pub fn aggregate(items: &[HistoryItem]) -> Stats {
  let total = items.len();
  let correct_count = items.iter().filter(|i| i.is_correct).count();
  let accuracy_percent = if total == 0 {
    0
  } else {
    (100.0 * correct_count as f64 / total as f64).round() as u32
  };
  Stats { correct_count, incorrect_count: total - correct_count, accuracy_percent }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayStats {
  pub date: NaiveDate,
  pub correct: usize,
  pub incorrect: usize,
}

/// Per-day correct/incorrect counts, oldest day first.
pub fn daily(items: &[HistoryItem]) -> Vec<DayStats> {
  let mut by_day: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
  for item in items {
    let Some(day) = DateTime::from_timestamp_millis(item.timestamp).map(|dt| dt.date_naive()) else {
      continue;
    };
    let entry = by_day.entry(day).or_default();
    if item.is_correct {
      entry.0 += 1;
    } else {
      entry.1 += 1;
    }
  }
  by_day
    .into_iter()
    .map(|(date, (correct, incorrect))| DayStats { date, correct, incorrect })
    .collect()
}

pub fn share_text(stats: &Stats) -> String {
  format!(
    "He estat practicant valencià amb IA! El meu progrés és de {}% d'encerts. Prova-la tu també!",
    stats.accuracy_percent
  )
}

#[cfg(test)]
pub(crate) mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::domain::tests::question;
  use crate::store::{BrokenStore, MemoryStore};

  pub(crate) fn item(level: Level, is_correct: bool, timestamp: i64) -> HistoryItem {
    let q = question(timestamp as usize % 100);
    let selected = if is_correct { q.correct_answer.clone() } else { q.options[1].clone() };
    HistoryItem { level, exercise: q, selected_answer: selected, is_correct, timestamp }
  }

  fn millis(y: i32, m: u32, d: u32, h: u32) -> i64 {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
      .and_hms_opt(h, 0, 0)
      .unwrap()
      .and_utc()
      .timestamp_millis()
  }

  #[test]
  fn test_append_is_most_recent_first_and_persisted() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let mut log = HistoryLog::load(store.clone());
    log.append(item(Level::B1, true, 1));
    log.append(item(Level::B2, false, 2));
    assert_eq!(log.items()[0].timestamp, 2);
    assert_eq!(log.items()[1].timestamp, 1);

    let reloaded = HistoryLog::load(store);
    assert_eq!(reloaded.items(), log.items());
  }

  #[test]
  fn test_record_stamps_increasing_timestamps() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let mut log = HistoryLog::load(store);
    let q = question(1);
    let (first, _) = log.record(Level::C1, q.clone(), q.correct_answer.clone());
    let (second, _) = log.record(Level::C1, q.clone(), q.options[2].clone());
    assert!(first.is_correct);
    assert!(!second.is_correct);
    assert!(second.timestamp > first.timestamp);
  }

  #[test]
  fn test_milestones_fire_once_each_in_order() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let mut log = HistoryLog::load(store);
    let mut fired = vec![];
    for n in 1..=30 {
      if let Some(m) = log.append(item(Level::B1, true, n)) {
        fired.push(m.count);
      }
    }
    assert_eq!(fired, vec![3, 10, 25]);
  }

  #[test]
  fn test_milestones_do_not_refire_after_clear() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let mut log = HistoryLog::load(store.clone());
    let mut fired = vec![];
    for n in 1..=4 {
      fired.extend(log.append(item(Level::B1, true, n)).map(|m| m.count));
    }
    assert_eq!(fired, vec![3]);

    log.clear();
    assert!(log.is_empty());
    for n in 1..=4 {
      assert!(log.append(item(Level::B1, true, n)).is_none());
    }

    // Also sticky across reloads.
    let mut reloaded = HistoryLog::load(store);
    reloaded.clear();
    for n in 1..=3 {
      assert!(reloaded.append(item(Level::B1, true, n)).is_none());
    }
  }

  #[test]
  fn test_history_survives_broken_store_in_memory() {
    let store: SharedStore = Arc::new(BrokenStore);
    let mut log = HistoryLog::load(store);
    log.append(item(Level::B1, true, 1));
    log.append(item(Level::B1, true, 2));
    let m = log.append(item(Level::B1, true, 3));
    assert_eq!(log.len(), 3);
    assert_eq!(m.map(|m| m.count), Some(3));
  }

  #[test]
  fn test_recent_sentences_takes_newest() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let mut log = HistoryLog::load(store);
    for n in 1..=25 {
      log.append(item(Level::B1, true, n));
    }
    let recent = log.recent_sentences(20);
    assert_eq!(recent.len(), 20);
    assert_eq!(recent[0], log.items()[0].exercise.sentence);
  }

  #[test]
  fn test_filter_is_conjunctive() {
    let items = vec![
      item(Level::B1, true, millis(2026, 3, 10, 12)),
      item(Level::B1, false, millis(2026, 3, 11, 9)),
      item(Level::C1, true, millis(2026, 3, 11, 23)),
      item(Level::C1, false, millis(2026, 3, 12, 0)),
    ];

    let all = HistoryFilter::default();
    assert!(!all.is_active());
    assert_eq!(all.apply(&items).len(), 4);

    let c1_wrong = HistoryFilter { level: Some(Level::C1), result: ResultFilter::Incorrect, ..Default::default() };
    let got = c1_wrong.apply(&items);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].timestamp, items[3].timestamp);

    let day = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
    let one_day = HistoryFilter { from: Some(day), to: Some(day), ..Default::default() };
    let got = one_day.apply(&items);
    assert_eq!(got.len(), 2);

    let correct_from = HistoryFilter { result: ResultFilter::Correct, from: Some(day), ..Default::default() };
    assert_eq!(correct_from.apply(&items).len(), 1);
  }

  #[test]
  fn test_aggregate() {
    assert_eq!(aggregate(&[]), Stats { correct_count: 0, incorrect_count: 0, accuracy_percent: 0 });

    let items = vec![
      item(Level::B1, true, 1),
      item(Level::B1, true, 2),
      item(Level::B1, false, 3),
    ];
    let s = aggregate(&items);
    assert_eq!(s.correct_count, 2);
    assert_eq!(s.incorrect_count, 1);
    assert_eq!(s.accuracy_percent, 67);
    assert!(share_text(&s).contains("67%"));
  }

  #[test]
  fn test_daily_groups_oldest_first() {
    let items = vec![
      item(Level::B1, false, millis(2026, 3, 12, 8)),
      item(Level::B1, true, millis(2026, 3, 10, 8)),
      item(Level::B1, true, millis(2026, 3, 10, 20)),
    ];
    let days = daily(&items);
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    assert_eq!((days[0].correct, days[0].incorrect), (2, 0));
    assert_eq!((days[1].correct, days[1].incorrect), (0, 1));
  }
}
