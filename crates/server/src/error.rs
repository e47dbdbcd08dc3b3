// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use station_view_core::ArtifactError;
use station_view_db::DbError;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No data available for station {0}")]
    NoData(String),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::NoData(station) => {
                tracing::debug!(station = %station, "No artifact for station");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("no data available", format!("Station: {station}")),
                )
            }
            ApiError::Artifact(artifact_err) => match artifact_err {
                ArtifactError::NotFound { path } => {
                    tracing::debug!(path = %path.display(), "Artifact not found");
                    (
                        StatusCode::NOT_FOUND,
                        ErrorResponse::new("no data available"),
                    )
                }
                ArtifactError::InvalidStation { station } => {
                    tracing::warn!(station = %station, "Invalid station identifier");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Bad request", artifact_err.to_string()),
                    )
                }
                ArtifactError::Malformed { path, message } => {
                    tracing::error!(path = %path.display(), message = %message, "Malformed artifact");
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        ErrorResponse::with_details("Malformed artifact", message.clone()),
                    )
                }
                ArtifactError::Io { path, source } => {
                    tracing::error!(path = %path.display(), error = %source, "IO error reading artifact");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("IO error reading artifact"),
                    )
                }
                ArtifactError::Serialize(e) => {
                    tracing::error!(error = %e, "Artifact serialization failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
            },
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Database error"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_no_data_returns_404() {
        let response = ApiError::NoData("StationK".into()).into_response();
        let (status, body) = extract_response(response).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "no data available");
        assert!(body.details.unwrap().contains("StationK"));
    }

    #[tokio::test]
    async fn test_missing_artifact_returns_404() {
        let error = ApiError::Artifact(ArtifactError::NotFound {
            path: PathBuf::from("/data/StationK_graph.json"),
        });
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "no data available");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_malformed_artifact_returns_422() {
        let error = ApiError::Artifact(ArtifactError::Malformed {
            path: PathBuf::from("/data/StationK_graph.json"),
            message: "missing key \"dates\"".into(),
        });
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error, "Malformed artifact");
        assert!(body.details.unwrap().contains("dates"));
    }

    #[tokio::test]
    async fn test_invalid_station_returns_400() {
        let error = ApiError::Artifact(ArtifactError::InvalidStation {
            station: "..".into(),
        });
        let (status, _) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_io_and_database_errors_hide_details() {
        let error = ApiError::Artifact(ArtifactError::Io {
            path: PathBuf::from("/srv/private/StationK_graph.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "IO error reading artifact");
        assert!(body.details.is_none());

        let error = ApiError::Database(DbError::CreateDir(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/private/records.db",
        )));
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Database error");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let error = ApiError::Internal("secret internal details".into());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_bad_request_returns_400() {
        let error = ApiError::BadRequest("unknown granularity: week".into());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.details.unwrap(), "unknown granularity: week");
    }

    #[test]
    fn test_error_response_serialization_skips_empty_details() {
        let json = serde_json::to_string(&ErrorResponse::new("Oops")).unwrap();
        assert_eq!(json, r#"{"error":"Oops"}"#);
    }
}
