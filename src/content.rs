//! Content source seam: where questions come from.
//!
//! `ContentSource` is the only way controllers obtain questions. The
//! production implementation wraps the OpenAI client; `Unconfigured` stands
//! in when no API key is available so every call fails with a config error
//! the UI can tell apart from a transient failure.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, instrument};

use crate::config::Prompts;
use crate::domain::{ExamSettings, Level, Question, Skill};
use crate::error::AppError;
use crate::openai::OpenAI;

/// Upper bound on the recent sentences sent along with an exercise request.
pub const MAX_RECENT_SENTENCES: usize = 20;

pub const MISSING_KEY_MESSAGE: &str = "La clau API no està configurada.";
const EXERCISE_FAILED: &str = "No s'ha pogut generar l'exercici. Intenta-ho de nou.";
const EXAM_FAILED: &str = "No s'ha pogut generar el simulacre d'examen. Intenta-ho de nou.";
const PLACEMENT_FAILED: &str = "No s'ha pogut generar el test de nivell. Intenta-ho de nou.";

#[async_trait]
pub trait ContentSource: Send + Sync {
  async fn fetch_exercise(
    &self,
    level: Level,
    skill: Skill,
    recent: &[String],
  ) -> Result<Question, AppError>;

  async fn fetch_exam(&self, level: Level, num_questions: u8) -> Result<Vec<Question>, AppError>;

  async fn fetch_placement_test(&self) -> Result<Vec<Question>, AppError>;

  fn is_configured(&self) -> bool {
    true
  }
}

pub type SharedContent = Arc<dyn ContentSource>;

/// Build the content source from env: OpenAI when a key is present.
pub fn content_from_env(prompts: Prompts) -> SharedContent {
  match OpenAI::from_env() {
    Some(oa) => Arc::new(OpenAiSource { oa, prompts }),
    None => Arc::new(Unconfigured),
  }
}

pub struct OpenAiSource {
  pub oa: OpenAI,
  pub prompts: Prompts,
}

#[async_trait]
impl ContentSource for OpenAiSource {
  #[instrument(level = "info", skip(self, recent), fields(recent = recent.len()))]
  async fn fetch_exercise(
    &self,
    level: Level,
    skill: Skill,
    recent: &[String],
  ) -> Result<Question, AppError> {
    let recent = &recent[..recent.len().min(MAX_RECENT_SENTENCES)];
    self
      .oa
      .generate_exercise(&self.prompts, level, skill, recent)
      .await
      .map_err(|e| {
        error!(target: "content", %level, error = %e, "Exercise generation failed");
        AppError::ContentGeneration(EXERCISE_FAILED.into())
      })
  }

  #[instrument(level = "info", skip(self))]
  async fn fetch_exam(&self, level: Level, num_questions: u8) -> Result<Vec<Question>, AppError> {
    if !ExamSettings::QUESTIONS_RANGE.contains(&num_questions) {
      return Err(AppError::InvalidInput(format!(
        "numQuestions must be between {} and {}",
        ExamSettings::QUESTIONS_RANGE.start(),
        ExamSettings::QUESTIONS_RANGE.end()
      )));
    }
    self
      .oa
      .generate_exam(&self.prompts, level, num_questions as usize)
      .await
      .map_err(|e| {
        error!(target: "content", %level, num_questions, error = %e, "Exam generation failed");
        AppError::ContentGeneration(EXAM_FAILED.into())
      })
  }

  #[instrument(level = "info", skip(self))]
  async fn fetch_placement_test(&self) -> Result<Vec<Question>, AppError> {
    self
      .oa
      .generate_placement(&self.prompts)
      .await
      .map_err(|e| {
        error!(target: "content", error = %e, "Placement test generation failed");
        AppError::ContentGeneration(PLACEMENT_FAILED.into())
      })
  }
}

/// Content source used when no credential is configured.
pub struct Unconfigured;

#[async_trait]
impl ContentSource for Unconfigured {
  async fn fetch_exercise(&self, _: Level, _: Skill, _: &[String]) -> Result<Question, AppError> {
    Err(AppError::Config(MISSING_KEY_MESSAGE.into()))
  }

  async fn fetch_exam(&self, _: Level, _: u8) -> Result<Vec<Question>, AppError> {
    Err(AppError::Config(MISSING_KEY_MESSAGE.into()))
  }

  async fn fetch_placement_test(&self) -> Result<Vec<Question>, AppError> {
    Err(AppError::Config(MISSING_KEY_MESSAGE.into()))
  }

  fn is_configured(&self) -> bool {
    false
  }
}
