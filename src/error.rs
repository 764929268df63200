use crate::logging::LogEngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Configuration error
    ConfigError(String),
    /// Malformed request parameter
    BadRequest(String),
    /// Log database is not available
    Unavailable(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::ConfigError(_) => "config_error",
        AppError::BadRequest(_) => "bad_request",
        AppError::Unavailable(_) => "unavailable",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<LogEngineError> for AppError {
    fn from(err: LogEngineError) -> Self {
        match err {
            LogEngineError::Unavailable | LogEngineError::Canceled => {
                Self::Unavailable(err.to_string())
            }
            LogEngineError::Config(msg) => Self::ConfigError(msg),
            LogEngineError::UnknownName { .. }
            | LogEngineError::InvalidId(_)
            | LogEngineError::InvalidDiscriminant { .. } => Self::BadRequest(err.to_string()),
            other => Self::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::BadRequest("unknown source 'lamp'".to_string());
        assert_eq!(error.to_string(), "Bad request: unknown source 'lamp'");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(error_type_name(&AppError::Unavailable("test".to_string())), "unavailable");
        assert_eq!(error_type_name(&AppError::BadRequest("test".to_string())), "bad_request");
    }

    #[test]
    fn test_engine_error_mapping() {
        assert!(matches!(
            AppError::from(LogEngineError::Unavailable),
            AppError::Unavailable(_)
        ));
        assert!(matches!(
            AppError::from(LogEngineError::UnknownName {
                kind: "LoggingSource",
                name: "lamp".to_string()
            }),
            AppError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_error_response() {
        let error = AppError::Unavailable("log database is not available".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
