//! API Routes
//!
//! Configures the Axum router with the exam and account endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    answer_handler, change_password_handler, confirm_account_handler,
    confirm_change_password_handler, exam_info_handler, exam_questions_handler, health_handler,
    request_confirmation_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /api/v1/exam/:exam_id` - Exam details with its phase
/// - `GET /api/v1/exam/:exam_id/questions?user_id=` - Question list
/// - `POST /api/v1/exam/answer` - Record an answer
/// - `POST /api/v1/user/changePassword` - Mail a password-change link
/// - `POST /api/v1/user/confirmChangePassword` - Redeem that link
/// - `POST /api/v1/user/requestConfirmation` - Mail an account-confirmation link
/// - `POST /api/v1/user/confirmAccount` - Redeem that link
/// - `GET /stats` - Cache, limiter and token statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let exam_routes = Router::new()
        .route("/answer", post(answer_handler))
        .route("/:exam_id", get(exam_info_handler))
        .route("/:exam_id/questions", get(exam_questions_handler));

    let user_routes = Router::new()
        .route("/changePassword", post(change_password_handler))
        .route("/confirmChangePassword", post(confirm_change_password_handler))
        .route("/requestConfirmation", post(request_confirmation_handler))
        .route("/confirmAccount", post(confirm_account_handler));

    Router::new()
        .nest("/api/v1/exam", exam_routes)
        .nest("/api/v1/user", user_routes)
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::layer::StateLayer;
    use crate::mail::LogMailer;
    use crate::store::MemoryBackend;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let clock = Arc::new(ManualClock::starting_now());
        let backend = MemoryBackend::new(clock.clone());
        let layer = StateLayer::new(
            Config::default(),
            backend.stores(),
            clock,
            Arc::new(LogMailer),
        )
        .unwrap();
        create_router(AppState::new(layer))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_exam_not_found() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/exam/404")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_change_password_empty_user_rejected() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/user/changePassword")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"user_id":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
