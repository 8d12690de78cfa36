use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),
    #[error("Invalid assignee: {0}")]
    InvalidAssignee(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateEmail(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InvalidAssignee(_) | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::NotFound(_) => "not_found",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::InvalidAssignee(_) => "invalid_assignee",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        Self::ProviderUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Serialization failed: {err}"))
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the logs.
        let message = match &self {
            Self::Storage(_) | Self::Internal(_) => {
                tracing::error!("Request failed: {self}");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.error_code(),
            "message": message
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PortalError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            PortalError::NotFound("ticket".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PortalError::DuplicateEmail("a@b.c".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PortalError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_transition_message() {
        let err = PortalError::InvalidTransition {
            from: "closed".into(),
            to: "open".into(),
        };
        assert_eq!(err.to_string(), "Invalid transition from closed to open");
        assert_eq!(err.error_code(), "invalid_transition");
    }
}
