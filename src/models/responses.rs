//! Response DTOs for the state layer API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::domain::{ExamId, ExamQuestion, UserId};

/// Response body for the change-link endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ChangeLinkResponse {
    pub email_sent: bool,
    pub lang: String,
}

impl ChangeLinkResponse {
    pub fn sent(lang: impl Into<String>) -> Self {
        Self {
            email_sent: true,
            lang: lang.into(),
        }
    }
}

/// Response body for a redeemed change request
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedResponse {
    pub confirmed: bool,
    pub user_id: UserId,
}

impl ConfirmedResponse {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            confirmed: true,
            user_id: user_id.into(),
        }
    }
}

/// Response body for GET /api/v1/exam/:exam_id/questions
#[derive(Debug, Clone, Serialize)]
pub struct QuestionsResponse {
    pub exam_id: ExamId,
    pub questions: Vec<ExamQuestion>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
