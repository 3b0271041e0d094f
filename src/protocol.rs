//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{HistoryItem, Level, Question, Skill, Theme};
use crate::error::AppError;
use crate::exam::ExamView;
use crate::history::{DayStats, HistoryFilter, Milestone, ResultFilter, Stats};
use crate::practice::PracticeView;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    PracticeStart {
        level: Level,
        skill: Skill,
    },
    PracticeAnswer {
        option: String,
    },
    PracticeNext,
    ExamOpen {
        level: Level,
    },
    ExamSettings {
        #[serde(rename = "numQuestions")]
        num_questions: u8,
        #[serde(rename = "timePerQuestion")]
        time_per_question: u32,
    },
    ExamBegin,
    ExamSelect {
        option: String,
    },
    ExamNext,
    ExamReview,
    ExamReviewSelect {
        option: String,
    },
    ExamReviewNext,
    PlacementStart,
    PlacementSelect {
        option: String,
    },
    PlacementNext,
    PlacementRetry,
    CloseController,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Practice {
        practice: PracticeView,
    },
    Exam {
        exam: ExamView,
    },
    Tick {
        remaining: u32,
    },
    Milestone {
        count: usize,
        message: String,
    },
    Error {
        message: String,
        retryable: bool,
    },
}

impl From<&AppError> for ServerWsMessage {
    fn from(err: &AppError) -> Self {
        ServerWsMessage::Error { message: err.to_string(), retryable: err.is_retryable() }
    }
}

impl From<Milestone> for ServerWsMessage {
    fn from(m: Milestone) -> Self {
        ServerWsMessage::Milestone { count: m.count, message: m.message }
    }
}

// ---- HTTP DTOs ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub content_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExerciseQuery {
    pub level: Level,
    pub skill: Skill,
}

/// Filter parameters; `level=all` (or absent) means every level.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub level: Option<String>,
    pub result: Option<ResultFilter>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl HistoryQuery {
    pub fn to_filter(&self) -> Result<HistoryFilter, AppError> {
        let level = match self.level.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(s.parse::<Level>().map_err(AppError::InvalidInput)?),
        };
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::InvalidInput("'from' must not be after 'to'".into()));
            }
        }
        Ok(HistoryFilter {
            level,
            result: self.result.unwrap_or_default(),
            from: self.from,
            to: self.to,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOut {
    pub items: Vec<HistoryItem>,
    pub stats: Stats,
    pub daily: Vec<DayStats>,
    pub share_text: String,
    /// Size of the unfiltered history.
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub level: Level,
    pub exercise: Question,
    pub selected_answer: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
    pub item: HistoryItem,
    pub milestone: Option<Milestone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesIn {
    pub theme: Option<Theme>,
    pub recommended_level: Option<Level>,
    pub onboarding_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub score: usize,
}

#[derive(Debug, Serialize)]
pub struct RecommendationOut {
    pub score: usize,
    pub level: Level,
}
