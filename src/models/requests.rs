//! Request DTOs for the state layer API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::domain::{ExamId, QuestionId, Secret};
use crate::exam::AnswerSubmission;
use crate::tokens::TokenCandidate;

/// Shortest accepted password, in characters
pub const MIN_PASSWORD_LENGTH: usize = 4;
/// Longest accepted password, in characters
pub const MAX_PASSWORD_LENGTH: usize = 24;

fn default_lang() -> String {
    "en".to_string()
}

fn validate_user_id(user_id: &str) -> Option<String> {
    if user_id.trim().is_empty() {
        return Some("user_id cannot be empty".to_string());
    }
    None
}

fn validate_password(password: &Secret) -> Option<String> {
    let length = password.expose().chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Some(format!(
            "password must be {MIN_PASSWORD_LENGTH} to {MAX_PASSWORD_LENGTH} characters long"
        ));
    }
    None
}

fn validate_token(token: &TokenCandidate) -> Option<String> {
    if token.request_id.is_empty() || token.transfer_param.is_empty() || token.binding.is_empty() {
        return Some("rq, rt and lt are required".to_string());
    }
    None
}

/// Request body for POST /api/v1/user/changePassword
/// and POST /api/v1/user/requestConfirmation
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeLinkRequest {
    pub user_id: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

impl ChangeLinkRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_user_id(&self.user_id)
    }
}

/// Request body for POST /api/v1/user/confirmChangePassword
///
/// Carries the three link parameters (`rq`, `rt`, `lt`) next to the new
/// password.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmChangePasswordRequest {
    #[serde(flatten)]
    pub token: TokenCandidate,
    pub new_password: Secret,
}

impl ConfirmChangePasswordRequest {
    pub fn validate(&self) -> Option<String> {
        validate_token(&self.token).or_else(|| validate_password(&self.new_password))
    }
}

/// Request body for POST /api/v1/user/confirmAccount
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmAccountRequest {
    #[serde(flatten)]
    pub token: TokenCandidate,
    pub password: Secret,
}

impl ConfirmAccountRequest {
    pub fn validate(&self) -> Option<String> {
        validate_token(&self.token).or_else(|| validate_password(&self.password))
    }
}

/// Request body for POST /api/v1/exam/answer
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub exam_id: ExamId,
    pub question_id: QuestionId,
    pub user_id: String,
    #[serde(default)]
    pub chosen_option: Option<String>,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub seconds_taken: u32,
}

impl AnswerRequest {
    pub fn validate(&self) -> Option<String> {
        if let Some(message) = validate_user_id(&self.user_id) {
            return Some(message);
        }
        if self.chosen_option.is_none() && self.answer_text.is_none() {
            return Some("either chosen_option or answer_text is required".to_string());
        }
        None
    }

    pub fn into_submission(self) -> AnswerSubmission {
        AnswerSubmission {
            exam_id: self.exam_id,
            question_id: self.question_id,
            user_id: crate::domain::normalize_user_id(&self.user_id),
            chosen_option: self.chosen_option,
            answer_text: self.answer_text,
            seconds_taken: self.seconds_taken,
        }
    }
}

/// Query string of GET /api/v1/exam/:exam_id/questions
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionsQuery {
    pub user_id: String,
}
