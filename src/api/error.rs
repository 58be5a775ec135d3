use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::application::AppError;

/// Wraps an [`AppError`] so it can be returned from handlers.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::AccountNotFound(_) | AppError::TournamentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyJoined { .. }
            | AppError::TournamentFull { .. }
            | AppError::TournamentClosed { .. }
            | AppError::AccountAlreadyExists(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            AppError::NotParticipant { .. } => StatusCode::NOT_FOUND,
            AppError::TournamentNotCompleted { .. }
            | AppError::InvalidTransition { .. }
            | AppError::InvalidAmount(_)
            | AppError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            error!(error = ?self.0, "storage failure");
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
