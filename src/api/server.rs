use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::auth::Authenticator;
use crate::chat::{ChatId, ChatMessage, ChatSession};
use crate::entity::{Role, UserIdentity};
use crate::manager::{acknowledgement, SessionCore};
use crate::matching::{MatchKind, PREDEFINED_TOPICS};
use crate::moderation::{ensure_moderator, resolve_reason, ChatOverview, Report, REPORT_REASONS};
use crate::store::SessionSnapshot;

// -----------------------------------------------------------------------------
// Request / response bodies
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
    pub verification_document: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartMatchingRequest {
    pub kind: MatchKind,
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchingResponse {
    pub attempt_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub reason: String,
    /// Free text, used when `reason` is "Other".
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: Report,
    pub acknowledgement: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub chat_id: Option<ChatId>,
}

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

pub struct AppState {
    pub core: SessionCore,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    async fn require_user(&self) -> ApiResult<UserIdentity> {
        self.auth.current().await.ok_or(ApiError::Unauthenticated)
    }

    async fn require_moderator(&self) -> ApiResult<UserIdentity> {
        let user = self.require_user().await?;
        ensure_moderator(user.role).map_err(ApiError::Forbidden)?;
        Ok(user)
    }
}

// -----------------------------------------------------------------------------
// Implementation
// -----------------------------------------------------------------------------

pub struct ApiServer {
    core: SessionCore,
    auth: Arc<Authenticator>,
}

impl ApiServer {
    pub fn new(core: SessionCore, auth: Arc<Authenticator>) -> Self {
        Self { core, auth }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            core: self.core.clone(),
            auth: self.auth.clone(),
        });

        Router::new()
            .route("/health", get(health_handler))
            .route("/auth/login", post(login_handler))
            .route("/auth/register", post(register_handler))
            .route("/auth/logout", post(logout_handler))
            .route("/auth/me", get(me_handler))
            .route("/state", get(state_handler))
            .route("/events", get(events_handler))
            .route("/topics", get(topics_handler))
            .route("/report-reasons", get(report_reasons_handler))
            .route("/matching/start", post(start_matching_handler))
            .route("/matching/stop", post(stop_matching_handler))
            .route("/chat/messages", post(send_message_handler))
            .route("/chat/report", post(report_handler))
            .route("/chat/leave", post(leave_handler))
            .route("/chats/:id/select", post(select_handler))
            .route("/moderation/reports", get(moderation_reports_handler))
            .route("/moderation/chats", get(moderation_chats_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<UserIdentity>> {
    let user = state
        .auth
        .login(&request.username, &request.password, request.role)
        .await?;
    state.core.set_local_user(Some(&user)).await;
    Ok(Json(user))
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<UserIdentity>> {
    let user = state
        .auth
        .register(
            &request.username,
            &request.password,
            request.role,
            request.verification_document.as_deref(),
        )
        .await?;
    state.core.set_local_user(Some(&user)).await;
    Ok(Json(user))
}

async fn logout_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.auth.logout().await;
    state.core.set_local_user(None).await;
    StatusCode::NO_CONTENT
}

async fn me_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<UserIdentity>> {
    Ok(Json(state.require_user().await?))
}

async fn state_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<SessionSnapshot>> {
    state.require_user().await?;
    Ok(Json(state.core.snapshot().await))
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, axum::BoxError>>>> {
    state.require_user().await?;
    info!("New SSE subscriber");

    // Subscribe before snapshotting so nothing between the two is lost
    let core = state.core.clone();
    let mut rx = core.event_bus().subscribe();
    let snapshot = core.snapshot().await;

    let stream = async_stream::stream! {
        yield sse_event("snapshot", &snapshot);

        loop {
            match rx.recv().await {
                Ok(event) => yield sse_event("update", &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Updates were dropped; drop the stale backlog too and
                    // resync the client from a fresh snapshot.
                    warn!(skipped, "SSE subscriber lagged, resending snapshot");
                    rx = rx.resubscribe();
                    yield sse_event("snapshot", &core.snapshot().await);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Result<SseEvent, axum::BoxError> {
    SseEvent::default()
        .event(name)
        .json_data(payload)
        .map_err(Into::into)
}

async fn topics_handler() -> Json<&'static [&'static str]> {
    Json(PREDEFINED_TOPICS)
}

async fn report_reasons_handler() -> Json<&'static [&'static str]> {
    Json(REPORT_REASONS)
}

async fn start_matching_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartMatchingRequest>,
) -> ApiResult<(StatusCode, Json<MatchingResponse>)> {
    state.require_user().await?;
    let attempt_id = state
        .core
        .start_matching(request.kind, request.topic.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(MatchingResponse { attempt_id })))
}

async fn stop_matching_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MatchingResponse>> {
    state.require_user().await?;
    let attempt_id = state.core.stop_matching().await?;
    Ok(Json(MatchingResponse { attempt_id }))
}

async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    state.require_user().await?;
    let message = state.core.send_message(&request.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Json<ReportResponse>> {
    state.require_user().await?;
    let reason = resolve_reason(&request.reason, request.details.as_deref())?;
    let report = state.core.report_user(&reason).await?;
    Ok(Json(ReportResponse {
        acknowledgement: acknowledgement(&report.reason),
        report,
    }))
}

async fn leave_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<LeaveResponse>> {
    state.require_user().await?;
    let chat_id = state.core.leave_chat().await;
    Ok(Json(LeaveResponse { chat_id }))
}

async fn select_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    state.require_user().await?;
    let session = state.core.select_chat(&ChatId(chat_id)).await?;
    Ok(Json(session))
}

async fn moderation_reports_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Report>>> {
    state.require_moderator().await?;
    Ok(Json(state.core.reports().await))
}

async fn moderation_chats_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ChatOverview>>> {
    state.require_moderator().await?;
    Ok(Json(state.core.chat_overview().await))
}
