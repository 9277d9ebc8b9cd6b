//! Structured error types for API and CLI responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,

    // Not found errors
    ProjectNotFound,
    TaskNotFound,

    // Conflict errors
    AlreadyExists,
    AlreadyAnswered,
    TaskCompleted,

    // Policy errors
    AnonymousNotAllowed,

    // Internal errors
    DatabaseError,
    InternalError,
}

/// Structured error carried through `anyhow` and rendered by the HTTP layer.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn project_not_found(project_id: i64) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", project_id),
        )
    }

    pub fn task_not_found(task_id: i64) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn already_exists(what: &str, name: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("{} already exists: {}", what, name),
        )
    }

    pub fn already_answered(task_id: i64, requester: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AlreadyAnswered,
            format!("{} has already answered task {}", requester, task_id),
        )
    }

    pub fn task_completed(task_id: i64) -> Self {
        Self::new(
            ErrorCode::TaskCompleted,
            format!("Task {} is already completed", task_id),
        )
    }

    pub fn anonymous_not_allowed(project_id: i64) -> Self {
        Self::new(
            ErrorCode::AnonymousNotAllowed,
            format!("Project {} does not allow anonymous contributors", project_id),
        )
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    /// HTTP status code matching this error.
    pub fn status_code(&self) -> u16 {
        match self.code {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => 400,
            ErrorCode::ProjectNotFound | ErrorCode::TaskNotFound => 404,
            ErrorCode::AlreadyExists | ErrorCode::AlreadyAnswered | ErrorCode::TaskCompleted => 409,
            ErrorCode::AnonymousNotAllowed => 403,
            ErrorCode::DatabaseError | ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => ApiError::database(db_err),
                Err(err) => ApiError::internal(err),
            },
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasts_wrapped_api_error() {
        let err: anyhow::Error = ApiError::task_not_found(4).into();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::TaskNotFound);
        assert_eq!(api.status_code(), 404);
    }

    #[test]
    fn unknown_errors_become_internal() {
        let api: ApiError = anyhow::anyhow!("boom").into();
        assert_eq!(api.code, ErrorCode::InternalError);
        assert_eq!(api.status_code(), 500);
    }

    #[test]
    fn serializes_codes_in_screaming_snake_case() {
        let json = serde_json::to_value(ApiError::missing_field("project_id")).unwrap();
        assert_eq!(json["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(json["field"], "project_id");
        assert!(json.get("details").is_none());
    }
}
