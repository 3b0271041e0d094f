//! Exam simulation and placement-test flow controller.
//!
//! The controller is a synchronous state machine with no clock of its own:
//!
//! ```text
//! start -> loading -> in_progress -> finished <-> reviewing_failed
//!            ^  |
//!            +--+ (load failure returns to start / load_failed)
//! ```
//!
//! Whoever drives it (the WebSocket session) owns the one-second countdown
//! and feeds `tick` with the `TickToken` it was started for. Every position
//! change bumps the controller epoch, so a tick scheduled for an earlier
//! position is ignored instead of advancing the wrong question. Content loads
//! are matched the same way through `LoadTicket`.
//!
//! The placement variant starts directly in `loading`, is untimed, cannot
//! review failed questions, and yields a recommended level when finished.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ExamSettings, Level, Question};
use crate::error::AppError;

static EPOCH: AtomicU64 = AtomicU64::new(1);

/// Epochs are process-wide so tickets from a replaced controller can never
/// match the controller that replaced it.
pub(crate) fn next_epoch() -> u64 {
  EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Identifies one outstanding content request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket(pub(crate) u64);

/// Identifies the question position a countdown was started for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickToken(pub(crate) u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
  Exam,
  Placement,
}

/// Content request the driver must issue for a `LoadTicket`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadRequest {
  Exam { level: Level, num_questions: u8 },
  Placement,
}

/// Displayable load error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
  pub message: String,
  pub retryable: bool,
}

impl From<&AppError> for Failure {
  fn from(err: &AppError) -> Self {
    Self { message: err.to_string(), retryable: err.is_retryable() }
  }
}

/// One loaded set of questions and the answers recorded against it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
  questions: Vec<Question>,
  answers: BTreeMap<usize, String>,
}

impl Batch {
  pub fn new(questions: Vec<Question>) -> Self {
    Self { questions, answers: BTreeMap::new() }
  }

  pub fn questions(&self) -> &[Question] {
    &self.questions
  }

  pub fn len(&self) -> usize {
    self.questions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.questions.is_empty()
  }

  pub fn answer(&self, position: usize) -> Option<&str> {
    self.answers.get(&position).map(String::as_str)
  }

  fn record(&mut self, position: usize, option: String) {
    self.answers.insert(position, option);
  }

  fn is_correct_at(&self, position: usize) -> bool {
    match (self.questions.get(position), self.answer(position)) {
      (Some(q), Some(a)) => q.is_correct(a),
      _ => false,
    }
  }

  pub fn score(&self) -> usize {
    (0..self.questions.len()).filter(|&i| self.is_correct_at(i)).count()
  }

  /// Positions answered wrongly or not at all, in batch order.
  pub fn failed_positions(&self) -> Vec<usize> {
    (0..self.questions.len()).filter(|&i| !self.is_correct_at(i)).collect()
  }

  pub fn failed_questions(&self) -> Vec<&Question> {
    self.failed_positions().into_iter().map(|i| &self.questions[i]).collect()
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFeedback {
  pub selected: String,
  pub is_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
  Start,
  Loading,
  /// `remaining` is None for an untimed flow.
  InProgress { position: usize, remaining: Option<u32> },
  Finished { score: usize },
  /// `items` is the failed set captured when the review began.
  ReviewingFailed { items: Vec<usize>, cursor: usize, feedback: Option<ReviewFeedback> },
  /// Placement only: the initial load failed and can be retried.
  LoadFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
  /// Token did not match the current position, or nothing is counting down.
  Ignored,
  Counting(u32),
  Advanced,
  Finished,
}

pub struct ExamController {
  variant: Variant,
  level: Option<Level>,
  settings: ExamSettings,
  phase: Phase,
  batch: Option<Batch>,
  epoch: u64,
  error: Option<Failure>,
  reviewed: bool,
  recommendation: Option<Level>,
  unreported_recommendation: Option<Level>,
}

impl ExamController {
  /// Timed exam simulation at a fixed level, waiting in `start`.
  pub fn exam(level: Level, settings: ExamSettings) -> Self {
    Self {
      variant: Variant::Exam,
      level: Some(level),
      settings,
      phase: Phase::Start,
      batch: None,
      epoch: next_epoch(),
      error: None,
      reviewed: false,
      recommendation: None,
      unreported_recommendation: None,
    }
  }

  /// Placement test, already loading.
  pub fn placement() -> (Self, LoadTicket) {
    let epoch = next_epoch();
    let ctl = Self {
      variant: Variant::Placement,
      level: None,
      settings: ExamSettings::default(),
      phase: Phase::Loading,
      batch: None,
      epoch,
      error: None,
      reviewed: false,
      recommendation: None,
      unreported_recommendation: None,
    };
    (ctl, LoadTicket(epoch))
  }

  pub fn phase(&self) -> &Phase {
    &self.phase
  }

  pub fn batch(&self) -> Option<&Batch> {
    self.batch.as_ref()
  }

  pub fn error(&self) -> Option<&Failure> {
    self.error.as_ref()
  }

  pub fn recommendation(&self) -> Option<Level> {
    self.recommendation
  }

  /// Recommended level from a finished placement test, reported once.
  pub fn take_recommendation(&mut self) -> Option<Level> {
    self.unreported_recommendation.take()
  }

  /// Edit settings while in `start`. No transition.
  pub fn set_settings(&mut self, settings: ExamSettings) -> Result<(), AppError> {
    if self.variant != Variant::Exam || self.phase != Phase::Start {
      return Err(AppError::InvalidInput("settings can only be changed before the exam starts".into()));
    }
    settings.validate().map_err(AppError::InvalidInput)?;
    self.settings = settings;
    Ok(())
  }

  /// The request a driver must issue for the current load.
  pub fn load_request(&self) -> LoadRequest {
    match (self.variant, self.level) {
      (Variant::Exam, Some(level)) => LoadRequest::Exam { level, num_questions: self.settings.num_questions },
      _ => LoadRequest::Placement,
    }
  }

  /// Enter `loading`. Refused while a load is already pending or a run is underway.
  pub fn begin(&mut self) -> Option<LoadTicket> {
    let allowed = match self.variant {
      Variant::Exam => self.phase == Phase::Start,
      Variant::Placement => self.phase == Phase::LoadFailed,
    };
    if !allowed {
      debug!(target: "exam", phase = ?self.phase, "begin refused");
      return None;
    }
    self.epoch = next_epoch();
    self.error = None;
    self.phase = Phase::Loading;
    info!(target: "exam", variant = ?self.variant, level = ?self.level, num_questions = self.settings.num_questions, "Loading questions");
    Some(LoadTicket(self.epoch))
  }

  /// Apply the result of a content request. Returns false if the ticket is stale.
  pub fn install(&mut self, ticket: LoadTicket, result: Result<Vec<Question>, AppError>) -> bool {
    if self.phase != Phase::Loading || ticket.0 != self.epoch {
      debug!(target: "exam", ticket = ticket.0, epoch = self.epoch, "Discarding superseded load result");
      return false;
    }
    let result = result.map(Batch::new).and_then(|batch| {
      if batch.is_empty() {
        Err(AppError::ContentGeneration("El contingut generat no conté cap pregunta.".into()))
      } else {
        Ok(batch)
      }
    });
    match result {
      Ok(batch) => {
        info!(target: "exam", variant = ?self.variant, count = batch.len(), "Batch installed");
        self.batch = Some(batch);
        self.reviewed = false;
        self.recommendation = None;
        self.unreported_recommendation = None;
        self.enter_position(0);
      }
      Err(err) => {
        warn!(target: "exam", variant = ?self.variant, error = %err, "Load failed");
        self.error = Some(Failure::from(&err));
        self.epoch = next_epoch();
        self.phase = match self.variant {
          Variant::Exam => Phase::Start,
          Variant::Placement => Phase::LoadFailed,
        };
      }
    }
    true
  }

  fn countdown_seconds(&self) -> Option<u32> {
    match self.variant {
      Variant::Exam => Some(self.settings.time_per_question),
      Variant::Placement => None,
    }
  }

  fn enter_position(&mut self, position: usize) {
    self.epoch = next_epoch();
    self.phase = Phase::InProgress { position, remaining: self.countdown_seconds() };
  }

  /// Token for the countdown of the current position, if one should be running.
  pub fn tick_token(&self) -> Option<TickToken> {
    match self.phase {
      Phase::InProgress { remaining: Some(_), .. } => Some(TickToken(self.epoch)),
      _ => None,
    }
  }

  /// One second elapsed for the countdown identified by `token`.
  pub fn tick(&mut self, token: TickToken) -> TickOutcome {
    if token.0 != self.epoch {
      return TickOutcome::Ignored;
    }
    let Phase::InProgress { position, remaining: Some(remaining) } = self.phase else {
      return TickOutcome::Ignored;
    };
    let left = remaining.saturating_sub(1);
    if left > 0 {
      self.phase = Phase::InProgress { position, remaining: Some(left) };
      return TickOutcome::Counting(left);
    }
    info!(target: "exam", position, answered = self.current_answer().is_some(), "Time expired");
    self.advance()
  }

  pub fn current_answer(&self) -> Option<&str> {
    match (&self.phase, &self.batch) {
      (Phase::InProgress { position, .. }, Some(batch)) => batch.answer(*position),
      _ => None,
    }
  }

  /// Record (or overwrite) the answer for the current position.
  pub fn select(&mut self, option: &str) -> Result<(), AppError> {
    let (Phase::InProgress { position, .. }, Some(batch)) = (&self.phase, self.batch.as_mut()) else {
      return Err(AppError::InvalidInput("no question in progress".into()));
    };
    let position = *position;
    if !batch.questions()[position].has_option(option) {
      return Err(AppError::InvalidInput(format!("'{option}' is not an option of this question")));
    }
    batch.record(position, option.to_string());
    debug!(target: "exam", position, "Answer recorded");
    Ok(())
  }

  /// Whether an explicit `next` would be accepted.
  pub fn can_advance(&self) -> bool {
    self.current_answer().is_some()
  }

  /// Explicit advance; refused while the current position has no answer.
  pub fn next(&mut self) -> TickOutcome {
    if !self.can_advance() {
      return TickOutcome::Ignored;
    }
    self.advance()
  }

  fn advance(&mut self) -> TickOutcome {
    let (Phase::InProgress { position, .. }, Some(batch)) = (&self.phase, &self.batch) else {
      return TickOutcome::Ignored;
    };
    let next = *position + 1;
    if next < batch.len() {
      self.enter_position(next);
      TickOutcome::Advanced
    } else {
      self.finish();
      TickOutcome::Finished
    }
  }

  fn finish(&mut self) {
    let Some(batch) = &self.batch else { return };
    let score = batch.score();
    self.epoch = next_epoch();
    self.phase = Phase::Finished { score };
    if self.variant == Variant::Placement {
      let level = Level::recommend_for_score(score);
      self.recommendation = Some(level);
      self.unreported_recommendation = Some(level);
      info!(target: "exam", score, total = batch.len(), %level, "Placement test finished");
    } else {
      info!(target: "exam", score, total = batch.len(), failed = batch.len() - score, "Exam finished");
    }
  }

  pub fn score(&self) -> Option<usize> {
    match self.phase {
      Phase::Finished { score } => Some(score),
      _ => None,
    }
  }

  /// Start reviewing the failed questions. Exam variant only, from `finished`, with at least one failure.
  pub fn start_review(&mut self) -> bool {
    if self.variant != Variant::Exam || !matches!(self.phase, Phase::Finished { .. }) {
      return false;
    }
    let Some(batch) = &self.batch else { return false };
    let items = batch.failed_positions();
    if items.is_empty() {
      return false;
    }
    info!(target: "exam", failed = items.len(), again = self.reviewed, "Reviewing failed questions");
    self.reviewed = true;
    self.phase = Phase::ReviewingFailed { items, cursor: 0, feedback: None };
    true
  }

  /// First answer to the current review item is final. Returns its correctness.
  pub fn review_select(&mut self, option: &str) -> Result<Option<bool>, AppError> {
    let Phase::ReviewingFailed { items, cursor, feedback } = &mut self.phase else {
      return Err(AppError::InvalidInput("not reviewing failed questions".into()));
    };
    if feedback.is_some() {
      return Ok(None);
    }
    let Some(batch) = &self.batch else { return Ok(None) };
    let question = &batch.questions()[items[*cursor]];
    if !question.has_option(option) {
      return Err(AppError::InvalidInput(format!("'{option}' is not an option of this question")));
    }
    let is_correct = question.is_correct(option);
    *feedback = Some(ReviewFeedback { selected: option.to_string(), is_correct });
    Ok(Some(is_correct))
  }

  /// Move to the next failed question, or back to `finished` after the last one.
  /// Requires the current item to have been answered.
  pub fn review_next(&mut self) -> bool {
    let Phase::ReviewingFailed { items, cursor, feedback } = &mut self.phase else {
      return false;
    };
    if feedback.is_none() {
      return false;
    }
    if *cursor + 1 < items.len() {
      *cursor += 1;
      *feedback = None;
      return true;
    }
    let score = self.batch.as_ref().map(Batch::score).unwrap_or(0);
    self.phase = Phase::Finished { score };
    debug!(target: "exam", "Review finished");
    true
  }

  pub fn view(&self) -> ExamView {
    ExamView {
      variant: self.variant,
      level: self.level,
      settings: self.settings,
      state: self.phase_view(),
    }
  }

  fn phase_view(&self) -> PhaseView {
    match (&self.phase, &self.batch) {
      (Phase::Start, _) => PhaseView::Start { error: self.error.clone() },
      (Phase::Loading, _) => PhaseView::Loading,
      (Phase::LoadFailed, _) => PhaseView::LoadFailed {
        error: self.error.clone().unwrap_or(Failure { message: String::new(), retryable: true }),
      },
      (Phase::InProgress { position, remaining }, Some(batch)) => PhaseView::InProgress {
        position: *position,
        total: batch.len(),
        remaining: *remaining,
        question: QuestionPrompt::from(&batch.questions()[*position]),
        selected: batch.answer(*position).map(str::to_string),
        can_advance: batch.answer(*position).is_some(),
      },
      (Phase::Finished { score }, Some(batch)) => {
        let failed = batch.len() - score;
        PhaseView::Finished {
          score: *score,
          total: batch.len(),
          failed,
          can_review: self.variant == Variant::Exam && failed > 0,
          reviewed: self.reviewed,
          recommended_level: self.recommendation,
          results: batch
            .questions()
            .iter()
            .enumerate()
            .map(|(i, q)| ResultRow {
              question: q.clone(),
              selected: batch.answer(i).map(str::to_string),
              is_correct: batch.is_correct_at(i),
            })
            .collect(),
        }
      }
      (Phase::ReviewingFailed { items, cursor, feedback }, Some(batch)) => {
        let q = &batch.questions()[items[*cursor]];
        PhaseView::ReviewingFailed {
          index: *cursor,
          total: items.len(),
          question: QuestionPrompt::from(q),
          feedback: feedback.clone(),
          correct_answer: feedback.as_ref().map(|_| q.correct_answer.clone()),
          explanation: feedback.as_ref().map(|_| q.explanation.clone()),
          is_last: *cursor + 1 == items.len(),
        }
      }
      // Phases that carry a position always have a batch.
      (_, None) => PhaseView::Loading,
    }
  }
}

/// A question without its answer, for display while it is being attempted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuestionPrompt {
  pub sentence: String,
  pub options: Vec<String>,
}

impl From<&Question> for QuestionPrompt {
  fn from(q: &Question) -> Self {
    Self { sentence: q.sentence.clone(), options: q.options.clone() }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
  pub question: Question,
  pub selected: Option<String>,
  pub is_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
  pub variant: Variant,
  pub level: Option<Level>,
  pub settings: ExamSettings,
  pub state: PhaseView,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PhaseView {
  Start {
    error: Option<Failure>,
  },
  Loading,
  LoadFailed {
    error: Failure,
  },
  InProgress {
    position: usize,
    total: usize,
    remaining: Option<u32>,
    question: QuestionPrompt,
    selected: Option<String>,
    can_advance: bool,
  },
  Finished {
    score: usize,
    total: usize,
    failed: usize,
    can_review: bool,
    reviewed: bool,
    recommended_level: Option<Level>,
    results: Vec<ResultRow>,
  },
  ReviewingFailed {
    index: usize,
    total: usize,
    question: QuestionPrompt,
    feedback: Option<ReviewFeedback>,
    correct_answer: Option<String>,
    explanation: Option<String>,
    is_last: bool,
  },
}
