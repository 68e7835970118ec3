//! API Module
//!
//! HTTP handlers and routing for the exam state layer.
//!
//! # Endpoints
//! - `GET /api/v1/exam/:exam_id` - Exam details with its phase
//! - `GET /api/v1/exam/:exam_id/questions` - Question list for a viewer
//! - `POST /api/v1/exam/answer` - Record an answer
//! - `POST /api/v1/user/changePassword` - Mail a password-change link
//! - `POST /api/v1/user/confirmChangePassword` - Redeem a password-change link
//! - `POST /api/v1/user/requestConfirmation` - Mail an account-confirmation link
//! - `POST /api/v1/user/confirmAccount` - Redeem an account-confirmation link
//! - `GET /stats` - State layer statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, ClientAddr};
pub use routes::create_router;
