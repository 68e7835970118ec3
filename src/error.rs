//! Error types for the state layer
//!
//! Provides unified error handling using thiserror.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::exam::ExamPhase;

// == Entity Kind ==
/// Names the entity type an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Course,
    Topic,
    Exam,
    ExamQuestion,
    GivenExam,
    GivenAnswer,
}

impl EntityKind {
    /// Returns the snake_case name used in logs and cache labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Course => "course",
            EntityKind::Topic => "topic",
            EntityKind::Exam => "exam",
            EntityKind::ExamQuestion => "exam_question",
            EntityKind::GivenExam => "given_exam",
            EntityKind::GivenAnswer => "given_answer",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == State Error Enum ==
/// Unified error type for the state layer.
#[derive(Error, Debug)]
pub enum StateError {
    /// Entity absent (possibly answered from a negative cache entry)
    #[error("{0} not found")]
    NotFound(EntityKind),

    /// Uniqueness conflict on create
    #[error("{0} already exists")]
    AlreadyExists(EntityKind),

    /// Account setup was already completed
    #[error("account already confirmed")]
    AlreadyConfirmed,

    /// Token or request window elapsed
    #[error("request expired")]
    Expired,

    /// Malformed or unverifiable token or input
    #[error("invalid request data")]
    Invalid,

    /// Attempt threshold exceeded
    #[error("too many attempts, try again later")]
    RateLimited,

    /// Exam is not accepting answers in its current phase
    #[error("exam is not ongoing (phase: {0})")]
    ExamClosed(ExamPhase),

    /// Unexpected store or transport failure
    #[error("internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for StateError {
    fn into_response(self) -> Response {
        let status = match &self {
            StateError::NotFound(_) => StatusCode::NOT_FOUND,
            StateError::AlreadyExists(_) => StatusCode::CONFLICT,
            StateError::AlreadyConfirmed => StatusCode::CONFLICT,
            StateError::Expired => StatusCode::GONE,
            StateError::Invalid => StatusCode::BAD_REQUEST,
            StateError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            StateError::ExamClosed(_) => StatusCode::CONFLICT,
            StateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal detail stays in the logs
        let message = match &self {
            StateError::Internal(detail) => {
                error!(error = %detail, "internal failure while serving request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the state layer.
pub type Result<T> = std::result::Result<T, StateError>;
