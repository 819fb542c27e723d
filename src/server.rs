//! HTTP surface for the router, the scheduler and the gateway tools.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/route` | Route one query to at most one link |
//! | `POST` | `/sessions` | Open a conversation session |
//! | `POST` | `/sessions/{id}/turns` | Record a turn; user turns are routed |
//! | `DELETE` | `/sessions/{id}` | Forget a session |
//! | `POST` | `/sessions/{id}/schedule` | Schedule from the session's history |
//! | `GET`  | `/tools/list` | List the gateway operations |
//! | `POST` | `/tools/{name}` | Invoke one gateway operation |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `gateway_unavailable` (503), `timeout` (504), `remote_error` (502).
//!
//! Scheduling never answers with an error status: degraded outcomes are
//! ordinary `200` responses carrying a customer-facing message.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use concierge_core::models::{Category, ConversationTurn, MatchResult, Role, SchedulingOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::gateway::{GatewayClient, GatewayError, GatewayTool};
use crate::orchestrator::{
    parse_start_time, AppointmentOrchestrator, ContactOverride, ScheduleOptions,
};
use crate::router::{append_link, QueryRouter};
use crate::session::SessionStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    router: Arc<QueryRouter>,
    orchestrator: Arc<AppointmentOrchestrator<GatewayClient>>,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(
        router: QueryRouter,
        orchestrator: AppointmentOrchestrator<GatewayClient>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            router: Arc::new(router),
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(sessions),
        }
    }

    /// Build every component from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let router = QueryRouter::load(config)?;
        tracing::info!(resolvers = ?router.resolver_names(), "router ready");
        let gateway = GatewayClient::new(&config.gateway)?;
        if !gateway.is_configured() {
            tracing::warn!("gateway.url not set, scheduling runs in offline mode");
        }
        Ok(Self::new(
            router,
            AppointmentOrchestrator::new(gateway, config)?,
            SessionStore::from_config(&config.sessions),
        ))
    }
}

/// The application's routes with CORS applied.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/route", post(handle_route))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_clear_session))
        .route("/sessions/{id}/turns", post(handle_turn))
        .route("/sessions/{id}/schedule", post(handle_schedule))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(cors)
        .with_state(state)
}

/// Bind to `server.bind` and serve until the process is terminated.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "concierge listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let (status, code) = match &err {
            GatewayError::UnsupportedTool(_) => (StatusCode::NOT_FOUND, "not_found"),
            GatewayError::InvalidArguments { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            GatewayError::NotConfigured | GatewayError::Unreachable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable")
            }
            GatewayError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            GatewayError::Remote { .. }
            | GatewayError::MalformedResponse(_)
            | GatewayError::Incomplete { .. } => (StatusCode::BAD_GATEWAY, "remote_error"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

async fn require_session(state: &AppState, id: &str) -> Result<(), AppError> {
    if state.sessions.exists(id).await {
        Ok(())
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}

// ============ POST /route ============

#[derive(Deserialize)]
struct RouteRequest {
    query: String,
    #[serde(default)]
    category: Option<String>,
}

async fn handle_route(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<MatchResult>, AppError> {
    let within = req
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(state.router.route_in(&req.query, within).await))
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionCreated {
    session_id: String,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionCreated>) {
    let session_id = state.sessions.create().await;
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

async fn handle_clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.clear(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}

#[derive(Deserialize)]
struct TurnRequest {
    #[serde(default = "default_role")]
    role: Role,
    #[serde(alias = "content")]
    text: String,
    /// Draft assistant reply; returned with the routed link appended and
    /// recorded as the next turn.
    #[serde(default)]
    reply: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Serialize)]
struct TurnResponse {
    turns: usize,
    #[serde(rename = "match")]
    matched: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<String>,
}

async fn handle_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    require_session(&state, &id).await?;
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let matched = match req.role {
        Role::User => Some(state.router.route(&req.text).await),
        _ => None,
    };
    let mut turns = state
        .sessions
        .append(&id, ConversationTurn { role: req.role, text: req.text })
        .await;

    let reply = match (req.reply, &matched) {
        (Some(draft), Some(result)) => Some(append_link(&draft, result)),
        (Some(draft), None) => Some(draft),
        (None, _) => None,
    };
    if let Some(reply) = &reply {
        turns = state
            .sessions
            .append(&id, ConversationTurn::assistant(reply.clone()))
            .await;
    }

    Ok(Json(TurnResponse {
        turns,
        matched,
        reply,
    }))
}

#[derive(Deserialize, Default)]
struct ScheduleRequest {
    #[serde(flatten)]
    contact: ContactOverride,
    #[serde(default)]
    start: Option<String>,
}

async fn handle_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ScheduleRequest>>,
) -> Result<Json<SchedulingOutcome>, AppError> {
    require_session(&state, &id).await?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let start = req
        .start
        .as_deref()
        .map(parse_start_time)
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;
    let options = ScheduleOptions {
        contact: req.contact,
        start,
    };

    let history = state.sessions.history(&id).await;
    let outcome = state
        .orchestrator
        .schedule_from_conversation(&history, &options)
        .await;
    Ok(Json(outcome))
}

// ============ Tools ============

#[derive(Serialize)]
struct ToolSummary {
    name: &'static str,
    mutating: bool,
}

#[derive(Serialize)]
struct ToolListResponse {
    configured: bool,
    tools: Vec<ToolSummary>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = GatewayTool::names()
        .iter()
        .map(|&name| ToolSummary {
            name,
            mutating: !crate::gateway::is_read_only(name),
        })
        .collect();
    Json(ToolListResponse {
        configured: state.orchestrator.gateway().is_configured(),
        tools,
    })
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<serde_json::Value>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let args = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);
    let result = state
        .orchestrator
        .gateway()
        .invoke_named(&name, args)
        .await?;
    Ok(Json(serde_json::json!({ "result": result })))
}
