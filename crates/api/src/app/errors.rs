use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_core::DomainError;
use stockroom_infra::{EngineError, ErrorKind};

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let status = match err.kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock => StatusCode::CONFLICT,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind.as_str(), err.message)
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    engine_error_to_response(err.into())
}

/// Unparseable body (missing field, wrong type, bad JSON) as `invalid_argument`.
pub fn json_rejection(err: JsonRejection) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        ErrorKind::InvalidArgument.as_str(),
        err.body_text(),
    )
}

pub fn query_rejection(err: QueryRejection) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        ErrorKind::InvalidArgument.as_str(),
        err.body_text(),
    )
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (ErrorKind::InvalidArgument, StatusCode::BAD_REQUEST),
            (ErrorKind::NotFound, StatusCode::NOT_FOUND),
            (ErrorKind::InsufficientStock, StatusCode::CONFLICT),
            (ErrorKind::Conflict, StatusCode::CONFLICT),
            (ErrorKind::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, status) in cases {
            let res = engine_error_to_response(EngineError::new(kind, "x"));
            assert_eq!(res.status(), status);
        }
    }
}
