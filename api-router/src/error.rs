use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use retrieval_pipeline::{AnswerError, ResolveError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("'{input}' matches several collections")]
    AmbiguousCollection {
        input: String,
        candidates: Vec<String>,
    },

    #[error("A philosopher collection must be provided")]
    MissingCollection { known_collections: Vec<String> },

    #[error("Collection '{name}' not found")]
    CollectionNotFound {
        name: String,
        known_collections: Vec<String>,
    },
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Ambiguous { input, candidates } => {
                Self::AmbiguousCollection { input, candidates }
            }
            ResolveError::Missing { known } => Self::MissingCollection {
                known_collections: known,
            },
            ResolveError::NotFound { name, known } => Self::CollectionNotFound {
                name,
                known_collections: known,
            },
        }
    }
}

impl From<AnswerError> for ApiError {
    fn from(err: AnswerError) -> Self {
        match err {
            AnswerError::Resolve(err) => err.into(),
            err @ AnswerError::NoContent { .. } => Self::NotFound(err.to_string()),
            AnswerError::App(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_response) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(message),
            ),
            Self::ValidationError(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(message))
            }
            Self::NotFound(message) => (StatusCode::NOT_FOUND, ErrorResponse::new(message)),
            Self::AmbiguousCollection { candidates, .. } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    candidates: Some(candidates),
                    ..ErrorResponse::new(message)
                },
            ),
            Self::MissingCollection { known_collections } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    known_collections: Some(known_collections),
                    ..ErrorResponse::new(message)
                },
            ),
            Self::CollectionNotFound {
                known_collections, ..
            } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    known_collections: Some(known_collections),
                    ..ErrorResponse::new(message)
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    known_collections: Option<Vec<String>>,
}

impl ErrorResponse {
    fn new(error: String) -> Self {
        Self {
            error,
            status: "error".to_string(),
            candidates: None,
            known_collections: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::fmt::Debug;

    // Helper to check status code
    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    async fn body_json(error: ApiError) -> Value {
        let response = error.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("resource not found".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "resource not found"));

        let validation = AppError::Validation("invalid input".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid input"));

        let internal_error = AppError::VectorStore("connection refused".to_string());
        let api_error = ApiError::from(internal_error);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn test_answer_error_conversion() {
        let ambiguous = AnswerError::Resolve(ResolveError::Ambiguous {
            input: "john".to_string(),
            candidates: vec!["John Locke".to_string(), "John Stuart Mill".to_string()],
        });
        assert_status_code(ApiError::from(ambiguous), StatusCode::BAD_REQUEST);

        let missing = AnswerError::Resolve(ResolveError::Missing { known: Vec::new() });
        assert_status_code(ApiError::from(missing), StatusCode::BAD_REQUEST);

        let unknown = AnswerError::Resolve(ResolveError::NotFound {
            name: "Zeno".to_string(),
            known: vec!["Plato".to_string()],
        });
        assert_status_code(ApiError::from(unknown), StatusCode::NOT_FOUND);

        let empty = AnswerError::NoContent {
            collection: "Plato".to_string(),
        };
        let api_error = ApiError::from(empty);
        assert!(matches!(api_error, ApiError::NotFound(ref msg) if msg.contains("Plato")));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::NotFound("not found".to_string()),
            StatusCode::NOT_FOUND,
        );
        assert_status_code(
            ApiError::ValidationError("invalid input".to_string()),
            StatusCode::BAD_REQUEST,
        );
    }

    #[tokio::test]
    async fn test_collection_errors_carry_guidance() {
        let body = body_json(ApiError::AmbiguousCollection {
            input: "john".to_string(),
            candidates: vec!["John Locke".to_string(), "John Stuart Mill".to_string()],
        })
        .await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["candidates"][1], "John Stuart Mill");
        assert!(body.get("known_collections").is_none());

        let body = body_json(ApiError::CollectionNotFound {
            name: "Zeno".to_string(),
            known_collections: vec!["Plato".to_string()],
        })
        .await;
        assert_eq!(body["error"], "Collection 'Zeno' not found");
        assert_eq!(body["known_collections"][0], "Plato");
    }

    #[test]
    fn test_error_messages() {
        let message = "invalid data format";
        let error = ApiError::ValidationError(message.to_string());
        assert_eq!(error.to_string(), format!("Validation error: {message}"));

        let message = "user not found";
        let error = ApiError::NotFound(message.to_string());
        assert_eq!(error.to_string(), format!("Not found: {message}"));
    }

    #[test]
    fn test_internal_error_sanitization() {
        let sensitive_info = "db password incorrect";
        let api_error = ApiError::InternalError(sensitive_info.to_string());

        assert_eq!(api_error.to_string(), "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
