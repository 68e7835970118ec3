//! Request and Response models for the state layer API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    AnswerRequest, ChangeLinkRequest, ConfirmAccountRequest, ConfirmChangePasswordRequest,
    QuestionsQuery,
};
pub use responses::{ChangeLinkResponse, ConfirmedResponse, HealthResponse, QuestionsResponse};
