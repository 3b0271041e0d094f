//! Learner preferences persisted in the key-value store.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{ExamSettings, Level, Theme};
use crate::error::AppError;
use crate::store::{
  load_json, save_json, SharedStore, KEY_EXAM_SETTINGS, KEY_ONBOARDING, KEY_RECOMMENDED_LEVEL,
  KEY_THEME,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesOut {
  pub theme: Theme,
  pub exam_settings: ExamSettings,
  pub recommended_level: Option<Level>,
  pub onboarding_complete: bool,
}

pub struct Preferences {
  store: SharedStore,
  theme: Theme,
  exam_settings: ExamSettings,
  recommended_level: Option<Level>,
  onboarding_complete: bool,
}

impl Preferences {
  pub fn load(store: SharedStore) -> Self {
    let theme = load_json(store.as_ref(), KEY_THEME).unwrap_or_default();
    let exam_settings = load_json::<ExamSettings>(store.as_ref(), KEY_EXAM_SETTINGS)
      .filter(|s| s.validate().is_ok())
      .unwrap_or_default();
    let recommended_level = load_json(store.as_ref(), KEY_RECOMMENDED_LEVEL);
    let onboarding_complete = load_json(store.as_ref(), KEY_ONBOARDING).unwrap_or(false);
    Self { store, theme, exam_settings, recommended_level, onboarding_complete }
  }

  pub fn snapshot(&self) -> PreferencesOut {
    PreferencesOut {
      theme: self.theme,
      exam_settings: self.exam_settings,
      recommended_level: self.recommended_level,
      onboarding_complete: self.onboarding_complete,
    }
  }

  pub fn theme(&self) -> Theme {
    self.theme
  }

  pub fn exam_settings(&self) -> ExamSettings {
    self.exam_settings
  }

  pub fn recommended_level(&self) -> Option<Level> {
    self.recommended_level
  }

  pub fn set_theme(&mut self, theme: Theme) {
    self.theme = theme;
    save_json(self.store.as_ref(), KEY_THEME, &theme);
  }

  pub fn set_exam_settings(&mut self, settings: ExamSettings) -> Result<(), AppError> {
    settings.validate().map_err(AppError::InvalidInput)?;
    self.exam_settings = settings;
    save_json(self.store.as_ref(), KEY_EXAM_SETTINGS, &settings);
    info!(target: "practica_valencia", num_questions = settings.num_questions, time_per_question = settings.time_per_question, "Exam settings saved");
    Ok(())
  }

  pub fn set_recommended_level(&mut self, level: Level) {
    self.recommended_level = Some(level);
    save_json(self.store.as_ref(), KEY_RECOMMENDED_LEVEL, &level);
  }

  pub fn set_onboarding_complete(&mut self, done: bool) {
    self.onboarding_complete = done;
    save_json(self.store.as_ref(), KEY_ONBOARDING, &done);
  }
}
