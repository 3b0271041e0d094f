//! Domain models: levels, skills, questions, exam settings and history items.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Marker the content source puts where the learner must fill in a word.
pub const BLANK_MARKER: &str = "[BLANK]";

/// Proficiency tier. Ordered B1 < B2 < C1 < C2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
  B1,
  B2,
  C1,
  C2,
}

impl Level {
  pub fn as_str(&self) -> &'static str {
    match self {
      Level::B1 => "B1",
      Level::B2 => "B2",
      Level::C1 => "C1",
      Level::C2 => "C2",
    }
  }

  /// Level suggested after a placement test, from the number of correct answers (0..=10).
  pub fn recommend_for_score(score: usize) -> Level {
    match score {
      0..=2 => Level::B1,
      3..=5 => Level::B2,
      6..=8 => Level::C1,
      _ => Level::C2,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Level {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "B1" => Ok(Level::B1),
      "B2" => Ok(Level::B2),
      "C1" => Ok(Level::C1),
      "C2" => Ok(Level::C2),
      other => Err(format!("unknown level '{other}'")),
    }
  }
}

/// Practice area an exercise is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
  #[serde(rename = "Comprensió")]
  Comprehension,
  #[serde(rename = "Estructures Lingüístiques")]
  LinguisticStructures,
  #[serde(rename = "Expressió Escrita")]
  WrittenExpression,
  #[serde(rename = "Expressió Oral")]
  OralExpression,
}

impl Skill {
  pub fn label(&self) -> &'static str {
    match self {
      Skill::Comprehension => "Comprensió",
      Skill::LinguisticStructures => "Estructures Lingüístiques",
      Skill::WrittenExpression => "Expressió Escrita",
      Skill::OralExpression => "Expressió Oral",
    }
  }
}

/// One multiple-choice item as delivered by the content source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub sentence: String,
  pub options: Vec<String>,
  pub correct_answer: String,
  pub explanation: String,
}

impl Question {
  pub const OPTION_COUNT: usize = 4;

  /// Structural checks on a generated item: four distinct options,
  /// the correct answer among them, at most one blank marker.
  pub fn validate(&self) -> Result<(), String> {
    if self.sentence.trim().is_empty() {
      return Err("empty sentence".into());
    }
    if self.sentence.matches(BLANK_MARKER).count() > 1 {
      return Err("more than one blank marker".into());
    }
    if self.options.len() != Self::OPTION_COUNT {
      return Err(format!("expected {} options, got {}", Self::OPTION_COUNT, self.options.len()));
    }
    for (i, opt) in self.options.iter().enumerate() {
      if self.options[..i].contains(opt) {
        return Err(format!("duplicate option '{opt}'"));
      }
    }
    if !self.options.contains(&self.correct_answer) {
      return Err("correct answer is not one of the options".into());
    }
    Ok(())
  }

  pub fn has_option(&self, option: &str) -> bool {
    self.options.iter().any(|o| o == option)
  }

  /// Exact, case-sensitive comparison. No partial credit.
  pub fn is_correct(&self, answer: &str) -> bool {
    self.correct_answer == answer
  }
}

/// Exam simulation settings, persisted between runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSettings {
  pub num_questions: u8,
  pub time_per_question: u32,
}

impl ExamSettings {
  pub const QUESTIONS_RANGE: std::ops::RangeInclusive<u8> = 5..=20;
  pub const SECONDS_RANGE: std::ops::RangeInclusive<u32> = 30..=120;

  pub fn validate(&self) -> Result<(), String> {
    if !Self::QUESTIONS_RANGE.contains(&self.num_questions) {
      return Err(format!(
        "numQuestions must be between {} and {}",
        Self::QUESTIONS_RANGE.start(),
        Self::QUESTIONS_RANGE.end()
      ));
    }
    if !Self::SECONDS_RANGE.contains(&self.time_per_question) {
      return Err(format!(
        "timePerQuestion must be between {} and {} seconds",
        Self::SECONDS_RANGE.start(),
        Self::SECONDS_RANGE.end()
      ));
    }
    Ok(())
  }
}

impl Default for ExamSettings {
  fn default() -> Self {
    Self { num_questions: 5, time_per_question: 60 }
  }
}

/// One answered single-practice question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
  pub level: Level,
  pub exercise: Question,
  pub selected_answer: String,
  pub is_correct: bool,
  /// Creation time, epoch milliseconds.
  pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}
