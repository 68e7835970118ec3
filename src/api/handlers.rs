//! API Handlers
//!
//! HTTP request handlers translating between JSON bodies and state-layer
//! calls. Sensitive endpoints consult the rate limiter before anything else.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::request::Parts,
    Json,
};
use tracing::debug;

use crate::domain::{normalize_user_id, ExamId, GivenAnswer};
use crate::error::{Result, StateError};
use crate::exam::ExamOverview;
use crate::layer::{LayerStats, StateLayer};
use crate::models::{
    AnswerRequest, ChangeLinkRequest, ChangeLinkResponse, ConfirmAccountRequest,
    ConfirmChangePasswordRequest, ConfirmedResponse, HealthResponse, QuestionsQuery,
    QuestionsResponse,
};

// Route names used in rate-limiter keys
const EXAM_INFO_ROUTE: &str = "exam_info";
const CHANGE_PASSWORD_ROUTE: &str = "change_password";
const CONFIRM_CHANGE_PASSWORD_ROUTE: &str = "confirm_change_password";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub layer: Arc<StateLayer>,
}

impl AppState {
    pub fn new(layer: StateLayer) -> Self {
        Self {
            layer: Arc::new(layer),
        }
    }
}

// == Client Address ==
/// Address the rate limiter keys a request on.
///
/// Taken from the configured proxy header when present, otherwise from the
/// socket peer. A proxy header is only as trustworthy as the proxy that
/// sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

#[async_trait]
impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let forwarded = state
            .layer
            .config()
            .ip_proxy_header
            .as_deref()
            .and_then(|header| parts.headers.get(header))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let addr = forwarded.unwrap_or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        });
        Ok(ClientAddr(addr))
    }
}

fn reject_invalid(message: Option<String>) -> Result<()> {
    match message {
        Some(message) => {
            debug!(reason = %message, "rejected request body");
            Err(StateError::Invalid)
        }
        None => Ok(()),
    }
}

/// Handler for GET /api/v1/exam/:exam_id
pub async fn exam_info_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Path(exam_id): Path<ExamId>,
) -> Result<Json<ExamOverview>> {
    state.layer.check_rate(&client, EXAM_INFO_ROUTE)?;
    let overview = state.layer.exams().exam_overview(exam_id).await?;
    Ok(Json(overview))
}

/// Handler for GET /api/v1/exam/:exam_id/questions
pub async fn exam_questions_handler(
    State(state): State<AppState>,
    Path(exam_id): Path<ExamId>,
    Query(query): Query<QuestionsQuery>,
) -> Result<Json<QuestionsResponse>> {
    let viewer = state
        .layer
        .users()
        .resolve(&normalize_user_id(&query.user_id))
        .await?;
    let questions = state.layer.exams().questions_for(exam_id, &viewer).await?;

    Ok(Json(QuestionsResponse {
        exam_id,
        questions: questions.iter().map(|q| q.as_ref().clone()).collect(),
    }))
}

/// Handler for POST /api/v1/exam/answer
pub async fn answer_handler(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<GivenAnswer>> {
    reject_invalid(req.validate())?;
    let answer = state
        .layer
        .exams()
        .answer_question(req.into_submission())
        .await?;
    Ok(Json(GivenAnswer::clone(&answer)))
}

/// Handler for POST /api/v1/user/changePassword
pub async fn change_password_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Json(req): Json<ChangeLinkRequest>,
) -> Result<Json<ChangeLinkResponse>> {
    state.layer.check_rate(&client, CHANGE_PASSWORD_ROUTE)?;
    reject_invalid(req.validate())?;

    state
        .layer
        .request_password_change(&req.user_id, &req.lang)
        .await?;
    Ok(Json(ChangeLinkResponse::sent(req.lang)))
}

/// Handler for POST /api/v1/user/confirmChangePassword
pub async fn confirm_change_password_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Json(req): Json<ConfirmChangePasswordRequest>,
) -> Result<Json<ConfirmedResponse>> {
    state
        .layer
        .check_rate(&client, CONFIRM_CHANGE_PASSWORD_ROUTE)?;
    reject_invalid(req.validate())?;

    let user = state
        .layer
        .confirm_password_change(&req.token, req.new_password)
        .await?;
    Ok(Json(ConfirmedResponse::new(user.user_id.clone())))
}

/// Handler for POST /api/v1/user/requestConfirmation
pub async fn request_confirmation_handler(
    State(state): State<AppState>,
    Json(req): Json<ChangeLinkRequest>,
) -> Result<Json<ChangeLinkResponse>> {
    reject_invalid(req.validate())?;

    state
        .layer
        .request_account_confirmation(&req.user_id, &req.lang)
        .await?;
    Ok(Json(ChangeLinkResponse::sent(req.lang)))
}

/// Handler for POST /api/v1/user/confirmAccount
pub async fn confirm_account_handler(
    State(state): State<AppState>,
    Json(req): Json<ConfirmAccountRequest>,
) -> Result<Json<ConfirmedResponse>> {
    reject_invalid(req.validate())?;

    let user = state.layer.confirm_account(&req.token, req.password).await?;
    Ok(Json(ConfirmedResponse::new(user.user_id.clone())))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<LayerStats> {
    Json(state.layer.stats())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::domain::{Secret, UserDraft, UserRole};
    use crate::mail::LogMailer;
    use crate::store::{EntityStore, MemoryBackend};

    async fn state_with_user() -> AppState {
        let clock = Arc::new(ManualClock::starting_now());
        let backend = MemoryBackend::new(clock.clone());
        backend
            .users
            .insert(UserDraft {
                user_id: "alice".to_string(),
                full_name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password: Secret::new("pw"),
                role: UserRole::Student,
            })
            .await
            .unwrap();
        let layer = StateLayer::new(
            Config::default(),
            backend.stores(),
            clock,
            Arc::new(LogMailer),
        )
        .unwrap();
        AppState::new(layer)
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_change_password_handler_sends_link() {
        let state = state_with_user().await;
        let req = ChangeLinkRequest {
            user_id: "Alice".to_string(),
            lang: "en".to_string(),
        };

        let response = change_password_handler(
            State(state.clone()),
            ClientAddr("10.0.0.1".to_string()),
            Json(req),
        )
        .await
        .unwrap();

        assert!(response.email_sent);
        assert_eq!(state.layer.password_changes().outstanding(), 1);
    }

    #[tokio::test]
    async fn test_change_password_handler_rejects_empty_user() {
        let state = state_with_user().await;
        let req = ChangeLinkRequest {
            user_id: "  ".to_string(),
            lang: "en".to_string(),
        };

        let result =
            change_password_handler(State(state), ClientAddr("10.0.0.1".to_string()), Json(req))
                .await;
        assert!(matches!(result, Err(StateError::Invalid)));
    }

    #[tokio::test]
    async fn test_stats_handler_lists_caches() {
        let state = state_with_user().await;
        let response = stats_handler(State(state)).await;

        assert!(response.caches.contains_key("user"));
        assert!(response.caches.contains_key("course_name"));
        assert_eq!(response.outstanding_requests["change_password"], 0);
    }
}
