//! Core error taxonomy. Every public engine method returns one of these
//! five kinds; the HTTP shim maps each to a status code in `http::respond`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not leader (current leader: {leader:?})")]
    NotLeader { leader: Option<String> },

    #[error("forward to leader failed: {0}")]
    ForwardFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl ResponseError for CoordError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoordError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoordError::NotLeader { .. } => StatusCode::FORBIDDEN,
            CoordError::ForwardFailed(_) => StatusCode::BAD_GATEWAY,
            CoordError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_leader_maps_to_403() {
        let err = CoordError::NotLeader {
            leader: Some("node2".into()),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn invalid_input_maps_to_400() {
        let err = CoordError::InvalidInput("resource must not be empty".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backend_unavailable_maps_to_503() {
        let err = CoordError::BackendUnavailable("log backend timed out".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
