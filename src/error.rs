//! Application error taxonomy and its HTTP rendering.

use axum::{
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AppError {
  /// Required credential or setting absent. Not retryable without outside action.
  #[error("{0}")]
  Config(String),

  /// The content source failed or returned data we could not use.
  #[error("{0}")]
  ContentGeneration(String),

  /// Local state could not be read or written.
  #[error("persistence failure: {0}")]
  Persistence(String),

  /// The request itself was malformed or not allowed in the current state.
  #[error("{0}")]
  InvalidInput(String),
}

impl AppError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, AppError::ContentGeneration(_))
  }

  fn status(&self) -> StatusCode {
    match self {
      AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::ContentGeneration(_) => StatusCode::BAD_GATEWAY,
      AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    if let AppError::Persistence(msg) = &self {
      tracing::error!(target: "practica_valencia", error = %msg, "Persistence error reached a handler");
    }
    let body = Json(json!({
      "error": self.to_string(),
      "retryable": self.is_retryable(),
    }));
    (self.status(), body).into_response()
  }
}

impl From<JsonRejection> for AppError {
  fn from(rejection: JsonRejection) -> Self {
    AppError::InvalidInput(rejection.body_text())
  }
}

impl From<QueryRejection> for AppError {
  fn from(rejection: QueryRejection) -> Self {
    AppError::InvalidInput(rejection.body_text())
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::Persistence(err.to_string())
  }
}

impl From<serde_json::Error> for AppError {
  fn from(err: serde_json::Error) -> Self {
    AppError::Persistence(err.to_string())
  }
}
