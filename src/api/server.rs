use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::AuthService;
use crate::conversation::ConversationState;
use crate::dispatch::SendOutcome;
use crate::manager::Manager;

// -----------------------------------------------------------------------------
// Request/response bodies
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    outcome: SendOutcome,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "unknown session".to_string(),
        }),
    )
}

// -----------------------------------------------------------------------------
// Server state
// -----------------------------------------------------------------------------

pub struct ApiState {
    pub manager: Arc<Manager>,
    pub auth: Arc<AuthService>,
}

// -----------------------------------------------------------------------------
// Implementation
// -----------------------------------------------------------------------------

/// Local HTTP/SSE surface for UI shells. The UI holds no state of its own:
/// it POSTs user turns and re-renders from snapshots and the event stream.
pub struct ApiServer {
    manager: Arc<Manager>,
    auth: Arc<AuthService>,
}

impl ApiServer {
    pub fn new(manager: Arc<Manager>, auth: Arc<AuthService>) -> Self {
        Self { manager, auth }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ApiState {
            manager: self.manager.clone(),
            auth: self.auth.clone(),
        });

        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/sessions", post(create_session_handler))
            .route("/api/sessions/:id", get(get_session_handler))
            .route(
                "/api/sessions/:id/messages",
                post(send_message_handler).delete(clear_handler),
            )
            .route("/api/sessions/:id/retry", post(retry_handler))
            .route("/api/sessions/:id/events", get(events_handler))
            .route("/api/auth/login", post(login_handler))
            .route("/api/auth/logout", post(logout_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_session_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let convo = state.manager.create_session();
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: convo.session_id().to_string(),
        }),
    )
}

async fn get_session_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationState>, (StatusCode, Json<ErrorBody>)> {
    match state.manager.session(&id) {
        Some(convo) => Ok(Json(convo.snapshot())),
        None => Err(not_found()),
    }
}

async fn send_message_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    match state.manager.send(&id, &request.text).await {
        Some(outcome) => {
            let status = match outcome {
                SendOutcome::Busy => StatusCode::CONFLICT,
                _ => StatusCode::OK,
            };
            Ok((status, Json(SendResponse { outcome })))
        }
        None => Err(not_found()),
    }
}

async fn clear_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    if state.manager.clear(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

async fn retry_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    if state.manager.acknowledge_error(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

async fn events_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::BoxError>>>, (StatusCode, Json<ErrorBody>)>
{
    if state.manager.session(&id).is_none() {
        return Err(not_found());
    }

    info!("New SSE subscriber for session {}", id);
    let mut rx = state.manager.bus().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.session_id() != id {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(payload) => yield Ok(Event::default().data(payload)),
                        Err(_) => continue,
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Slow subscribers just miss events.
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

async fn login_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LoginRequest>,
) -> axum::response::Response {
    match state.auth.login(&request.email, &request.password).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn logout_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.auth.logout().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
