use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use encodeforge_common::Error;

/// Maps the job error taxonomy onto HTTP responses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyRunning(_) => StatusCode::CONFLICT,
        Error::ProbeFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::LaunchFailure(_)
        | Error::RuntimeFailure(_)
        | Error::Io(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}
