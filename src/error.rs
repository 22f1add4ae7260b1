//! API error type and its HTTP mapping.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, warn};

use crate::protocol::ErrorOut;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::upload::UploadError;

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
  pub field: &'static str,
  pub message: String,
}

impl ValidationError {
  pub fn new(field: &'static str, message: impl Into<String>) -> Self {
    Self { field, message: message.into() }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Session(#[from] SessionError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Upload(#[from] UploadError),
  #[error("{0} not found")]
  NotFound(String),
}

impl ApiError {
  pub fn code(&self) -> &'static str {
    match self {
      ApiError::Validation(_) => "validation_failed",
      ApiError::Session(_) => "invalid_session_action",
      ApiError::Store(StoreError::NotFound { .. }) | ApiError::NotFound(_) => "not_found",
      ApiError::Store(_) => "store_unavailable",
      ApiError::Upload(UploadError::TooLarge { .. } | UploadError::InvalidEncoding(_) | UploadError::Empty) => {
        "invalid_image"
      }
      ApiError::Upload(_) => "upload_failed",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::Session(_) => StatusCode::CONFLICT,
      ApiError::Store(StoreError::NotFound { .. }) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Store(_) => StatusCode::BAD_GATEWAY,
      ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Upload(UploadError::InvalidEncoding(_) | UploadError::Empty) => StatusCode::BAD_REQUEST,
      ApiError::Upload(UploadError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "nihongo_quiz", code = self.code(), error = %self, "Request failed");
    } else {
      warn!(target: "nihongo_quiz", code = self.code(), error = %self, "Request rejected");
    }
    let body = ErrorOut { error: self.code().to_string(), message: self.to_string() };
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn upload_failures_are_distinct_from_store_failures() {
    let upload = ApiError::from(UploadError::Rejected { status: 500, message: "boom".into() });
    let store = ApiError::from(StoreError::Transport("refused".into()));
    assert_eq!(upload.code(), "upload_failed");
    assert_eq!(store.code(), "store_unavailable");
    assert_eq!(upload.status(), StatusCode::BAD_GATEWAY);
  }

  #[test]
  fn invalid_transitions_are_conflicts() {
    let e = ApiError::from(SessionError::NotRevealed);
    assert_eq!(e.status(), StatusCode::CONFLICT);
    assert_eq!(ApiError::from(ValidationError::new("title", "required")).status(), StatusCode::BAD_REQUEST);
    assert_eq!(e.into_response().status(), StatusCode::CONFLICT);
  }
}
