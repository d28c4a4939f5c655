use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::warn;

use linkpeek_infra::CoordinatorError;

pub fn coordinator_error_to_response(err: &CoordinatorError) -> axum::response::Response {
    match err {
        CoordinatorError::Connection(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone())
        }
        // The identifier already passed path validation, so this is a corrupt record.
        CoordinatorError::Codec(e) => {
            warn!(error = %e, "stored embed could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "codec_error", e.to_string())
        }
        other => json_error(StatusCode::BAD_GATEWAY, "store_error", other.to_string()),
    }
}

pub fn not_found() -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
