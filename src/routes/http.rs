//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::State,
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::domain::{ExamSettings, Level, Question};
use crate::error::AppError;
use crate::export::EXPORT_FILENAME;
use crate::logic::*;
use crate::prefs::PreferencesOut;
use crate::protocol::*;
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, content_configured: state.content.is_configured() })
}

#[instrument(level = "info", skip(state), fields(level = %q.level, skill = q.skill.label()))]
pub async fn http_get_exercise(
  State(state): State<Arc<AppState>>,
  ApiQuery(q): ApiQuery<ExerciseQuery>,
) -> Result<Json<Question>, AppError> {
  let exercise = next_exercise(&state, q.level, q.skill).await?;
  Ok(Json(exercise))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_exam_settings(State(state): State<Arc<AppState>>) -> Json<ExamSettings> {
  Json(state.prefs.read().await.exam_settings())
}

#[instrument(level = "info", skip(state))]
pub async fn http_put_exam_settings(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<ExamSettings>,
) -> Result<Json<ExamSettings>, AppError> {
  let saved = save_exam_settings(&state, body).await?;
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_preferences(State(state): State<Arc<AppState>>) -> Json<PreferencesOut> {
  Json(state.prefs.read().await.snapshot())
}

#[instrument(level = "info", skip(state))]
pub async fn http_put_preferences(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<PreferencesIn>,
) -> Json<PreferencesOut> {
  let mut prefs = state.prefs.write().await;
  if let Some(theme) = body.theme {
    prefs.set_theme(theme);
  }
  if let Some(level) = body.recommended_level {
    prefs.set_recommended_level(level);
  }
  if let Some(done) = body.onboarding_complete {
    prefs.set_onboarding_complete(done);
  }
  Json(prefs.snapshot())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_history(
  State(state): State<Arc<AppState>>,
  ApiQuery(q): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryOut>, AppError> {
  let filter = q.to_filter()?;
  let report = history_report(&state, &filter).await;
  info!(target: "history", filtered = report.items.len(), total = report.total, "HTTP history served");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state, body), fields(level = %body.level))]
pub async fn http_post_history(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<AnswerIn>,
) -> Result<(StatusCode, Json<AnswerOut>), AppError> {
  body.exercise.validate().map_err(AppError::InvalidInput)?;
  if !body.exercise.has_option(&body.selected_answer) {
    return Err(AppError::InvalidInput("selectedAnswer is not one of the options".into()));
  }
  let (item, milestone) = record_answer(&state, body.level, body.exercise, body.selected_answer).await;
  Ok((StatusCode::CREATED, Json(AnswerOut { item, milestone })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_history(State(state): State<Arc<AppState>>) -> StatusCode {
  state.history.write().await.clear();
  StatusCode::NO_CONTENT
}

/// CSV attachment of the filtered history, or 204 when there is nothing to export.
#[instrument(level = "info", skip(state))]
pub async fn http_export_history(
  State(state): State<Arc<AppState>>,
  ApiQuery(q): ApiQuery<HistoryQuery>,
) -> Result<Response, AppError> {
  let filter = q.to_filter()?;
  let Some(csv) = history_export(&state, &filter).await else {
    info!(target: "history", "Nothing to export");
    return Ok(StatusCode::NO_CONTENT.into_response());
  };
  let headers = [
    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{EXPORT_FILENAME}\"")),
  ];
  Ok((headers, csv).into_response())
}

#[instrument(level = "info")]
pub async fn http_get_recommendation(
  ApiQuery(q): ApiQuery<RecommendationQuery>,
) -> Result<Json<RecommendationOut>, AppError> {
  if q.score > 10 {
    return Err(AppError::InvalidInput("score must be between 0 and 10".into()));
  }
  Ok(Json(RecommendationOut { score: q.score, level: Level::recommend_for_score(q.score) }))
}
