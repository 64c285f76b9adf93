//! The sole place `SequencerError::kind()` is matched against an HTTP
//! status. Adding a new error kind and forgetting to add it here is a
//! compile error, not a silent 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sequencer_core::SequencerError;
use serde_json::json;
use tracing::{error, warn};

pub struct AppError(pub SequencerError);

impl From<SequencerError> for AppError {
    fn from(err: SequencerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            "MalformedRequest" => StatusCode::BAD_REQUEST,
            "NotFound" => StatusCode::NOT_FOUND,
            "AlreadyExists" => StatusCode::CONFLICT,
            "Expired" => StatusCode::GONE,
            "BadTimestamp" => StatusCode::BAD_REQUEST,
            "StaleSequence" => StatusCode::CONFLICT,
            "AmountRegression" => StatusCode::BAD_REQUEST,
            "Insolvent" => StatusCode::PAYMENT_REQUIRED,
            "BadSignature" => StatusCode::UNAUTHORIZED,
            "StorageFailure" => StatusCode::INTERNAL_SERVER_ERROR,
            "SettlementReverted" => StatusCode::BAD_GATEWAY,
            "Timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "request rejected");
        }

        (status, Json(json!({ "error": format!("{}:{}", self.0.kind(), self.0) }))).into_response()
    }
}
