//! Single-question practice flow.
//!
//! `loading -> answering -> answered -> loading ...`, with `failed` when the
//! content source errors. The controller only decides what is allowed; the
//! session issues the request and records answered questions in the history.

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Level, Question, Skill};
use crate::error::AppError;
use crate::exam::{next_epoch, Failure, LoadTicket, QuestionPrompt};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PracticePhase {
  Loading,
  Answering,
  Answered { selected: String, is_correct: bool },
  Failed(Failure),
}

/// An answer the caller should record in the history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answered {
  pub level: Level,
  pub exercise: Question,
  pub selected: String,
  pub is_correct: bool,
}

pub struct PracticeController {
  level: Level,
  skill: Skill,
  phase: PracticePhase,
  exercise: Option<Question>,
  epoch: u64,
}

impl PracticeController {
  pub fn start(level: Level, skill: Skill) -> (Self, LoadTicket) {
    let epoch = next_epoch();
    let ctl = Self { level, skill, phase: PracticePhase::Loading, exercise: None, epoch };
    (ctl, LoadTicket(epoch))
  }

  pub fn level(&self) -> Level {
    self.level
  }

  pub fn skill(&self) -> Skill {
    self.skill
  }

  pub fn phase(&self) -> &PracticePhase {
    &self.phase
  }

  /// Request another exercise after answering, or retry after a failure.
  pub fn next(&mut self) -> Option<LoadTicket> {
    match self.phase {
      PracticePhase::Answered { .. } | PracticePhase::Failed(_) => {
        self.epoch = next_epoch();
        self.phase = PracticePhase::Loading;
        Some(LoadTicket(self.epoch))
      }
      _ => None,
    }
  }

  /// Apply a content result. Returns false if the ticket is stale.
  pub fn install(&mut self, ticket: LoadTicket, result: Result<Question, AppError>) -> bool {
    if self.phase != PracticePhase::Loading || ticket.0 != self.epoch {
      debug!(target: "practice", ticket = ticket.0, "Discarding superseded exercise");
      return false;
    }
    match result {
      Ok(q) => {
        self.exercise = Some(q);
        self.phase = PracticePhase::Answering;
      }
      Err(err) => {
        warn!(target: "practice", level = %self.level, error = %err, "Exercise load failed");
        self.phase = PracticePhase::Failed(Failure::from(&err));
      }
    }
    true
  }

  /// Answer the current exercise. Only the first answer counts; later ones return None.
  pub fn answer(&mut self, option: &str) -> Result<Option<Answered>, AppError> {
    if self.phase != PracticePhase::Answering {
      return Ok(None);
    }
    let Some(exercise) = &self.exercise else { return Ok(None) };
    if !exercise.has_option(option) {
      return Err(AppError::InvalidInput(format!("'{option}' is not an option of this exercise")));
    }
    let is_correct = exercise.is_correct(option);
    self.phase = PracticePhase::Answered { selected: option.to_string(), is_correct };
    Ok(Some(Answered {
      level: self.level,
      exercise: exercise.clone(),
      selected: option.to_string(),
      is_correct,
    }))
  }

  pub fn view(&self) -> PracticeView {
    let state = match (&self.phase, &self.exercise) {
      (PracticePhase::Failed(f), _) => PracticeState::Failed { error: f.clone() },
      (PracticePhase::Answering, Some(q)) => PracticeState::Answering { question: QuestionPrompt::from(q) },
      (PracticePhase::Answered { selected, is_correct }, Some(q)) => PracticeState::Answered {
        question: QuestionPrompt::from(q),
        selected: selected.clone(),
        is_correct: *is_correct,
        correct_answer: q.correct_answer.clone(),
        explanation: q.explanation.clone(),
      },
      _ => PracticeState::Loading,
    };
    PracticeView { level: self.level, skill: self.skill, state }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PracticeView {
  pub level: Level,
  pub skill: Skill,
  pub state: PracticeState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PracticeState {
  Loading,
  Answering {
    question: QuestionPrompt,
  },
  Answered {
    question: QuestionPrompt,
    selected: String,
    is_correct: bool,
    correct_answer: String,
    explanation: String,
  },
  Failed {
    error: Failure,
  },
}
