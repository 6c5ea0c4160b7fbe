//! Gateway HTTP + WebSocket server (single port).

use crate::agent;
use crate::config::{self, Config};
use crate::contact::{ContactClient, ContactError, ContactForm};
use crate::gateway::protocol::{ChatParams, WsRequest, WsResponse};
use crate::session::{ChatError, ChatSession, SessionEvent, SessionId, SessionStore};
use crate::transcript::Message as ChatMessage;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const PROTOCOL_VERSION: u32 = 1;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for the gateway (config, sessions, contact forwarding, events).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub contact: ContactClient,
    /// Broadcasts gateway-wide JSON event frames (shutdown) to every WebSocket client.
    pub event_tx: broadcast::Sender<String>,
    /// Transcript appends from every session. Each socket forwards only its own sessions.
    pub session_events: broadcast::Sender<SessionEvent>,
}

impl GatewayState {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let (session_events, _) = broadcast::channel(256);
        let responder = agent::build_responder(&config, &config_path);
        let sessions = SessionStore::new(responder, config.chat.typing_delay())
            .with_events(session_events.clone());
        let contact = ContactClient::new(
            config::resolve_contact_webhook(&config),
            Some(config.contact.source.clone()),
        );
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            contact,
            event_tx,
            session_events,
        }
    }
}

fn session_event_frame(event: &SessionEvent) -> String {
    json!({
        "type": "event",
        "event": "session.message",
        "payload": event,
    })
    .to_string()
}

/// Close sessions nobody has touched for `ttl`.
async fn sweep_idle_sessions(sessions: Arc<SessionStore>, ttl: Duration) {
    let period = (ttl / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let removed = sessions.remove_idle(ttl).await;
        if !removed.is_empty() {
            log::info!("closed {} idle sessions", removed.len());
        }
    }
}

/// JSON error response: `{ "error": "..." }` with a status code.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let status = match e {
            ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Closed => StatusCode::CONFLICT,
        };
        ApiError(status, e.to_string())
    }
}

/// One chat turn: submit and wait out the typing delay.
async fn chat_turn(session: &ChatSession, message: &str) -> Result<ChatMessage, ChatError> {
    let pending = session.submit(message).await?;
    // A cancelled reply means the session was reset or closed meanwhile.
    pending.wait().await.ok_or(ChatError::Closed)
}

async fn session_json(session: &ChatSession) -> serde_json::Value {
    let messages = session.transcript().await;
    json!({
        "sessionId": session.id(),
        "messages": messages,
    })
}

/// Build the gateway router over the given state.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/messages", post(post_message))
        .route("/sessions/:id/reset", post(reset_session))
        .route("/contact", post(submit_contact))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
/// `config_path` is the path to the config file (used to resolve the workspace).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!("gateway bound to non-loopback address {}; sessions are unauthenticated", bind);
    }
    let port = config.gateway.port;
    let state = GatewayState::new(config, config_path);
    let event_tx = state.event_tx.clone();
    let sessions = state.sessions.clone();
    log::info!("contact forms go to {}", state.contact.webhook_url());
    if let Some(ttl) = state.config.chat.session_idle_ttl() {
        tokio::spawn(sweep_idle_sessions(sessions.clone(), ttl));
    }
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx, sessions))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event to WebSocket clients and closes every session.
async fn shutdown_signal(event_tx: broadcast::Sender<String>, sessions: Arc<SessionStore>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and closing sessions");

    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
    sessions.close_all().await;
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(health_payload(&state).await)
}

async fn health_payload(state: &GatewayState) -> serde_json::Value {
    let sessions = state.sessions.len().await;
    json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
        "sessions": sessions,
    })
}

/// POST /sessions — new session with the greeting.
async fn create_session(State(state): State<GatewayState>) -> (StatusCode, Json<serde_json::Value>) {
    let session = state.sessions.create().await;
    (StatusCode::CREATED, Json(session_json(&session).await))
}

/// GET /sessions/:id — transcript.
async fn get_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.sessions.require(&id).await?;
    Ok(Json(session_json(&session).await))
}

/// DELETE /sessions/:id — close and forget.
async fn delete_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatError::NotFound(id).into())
    }
}

/// POST /sessions/:id/reset — cancel pending replies, back to the greeting.
async fn reset_session(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.sessions.require(&id).await?;
    session.reset().await;
    Ok(Json(session_json(&session).await))
}

/// POST /sessions/:id/messages — `{ "message" }`; responds after the typing delay.
async fn post_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(params): Json<ChatParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.sessions.require(&id).await?;
    let reply = chat_turn(&session, &params.message).await?;
    Ok(Json(json!({ "sessionId": session.id(), "reply": reply })))
}

/// POST /contact — forward the contact form to the webhook.
async fn submit_contact(
    State(state): State<GatewayState>,
    Json(form): Json<ContactForm>,
) -> Response {
    match state.contact.submit(&form).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            let status = match e {
                ContactError::MissingField(_) => StatusCode::BAD_REQUEST,
                ContactError::Request(_) | ContactError::Rejected(_) => StatusCode::BAD_GATEWAY,
            };
            log::warn!("contact submission failed: {}", e);
            (status, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
    }
}

/// GET /ws upgrades to WebSocket.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Sessions one WebSocket client may observe. Created ones are removed when it disconnects.
#[derive(Default)]
struct SocketSessions {
    watched: HashSet<SessionId>,
    created: Vec<SessionId>,
}

impl SocketSessions {
    fn created(&mut self, id: &str) {
        self.watched.insert(id.to_string());
        self.created.push(id.to_string());
    }

    fn joined(&mut self, id: &str) {
        self.watched.insert(id.to_string());
    }
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let mut event_rx = state.event_tx.subscribe();
    let mut session_rx = state.session_events.subscribe();
    let mut owned = SocketSessions::default();

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = socket.send(Message::Text(text)).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            event = session_rx.recv() => {
                match event {
                    Ok(event) if owned.watched.contains(&event.session_id) => {
                        if socket.send(Message::Text(session_event_frame(&event))).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} session events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(req): Result<WsRequest, _> = serde_json::from_str(&text) else { continue };
                if req.typ != "req" {
                    continue;
                }
                let res = handle_request(&state, &mut owned, req).await;
                let frame = serde_json::to_string(&res).unwrap_or_default();
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    for id in &owned.created {
        state.sessions.remove(id).await;
    }
    if !owned.created.is_empty() {
        log::debug!("ws client gone, closed {} sessions", owned.created.len());
    }
}

async fn handle_request(
    state: &GatewayState,
    owned: &mut SocketSessions,
    req: WsRequest,
) -> WsResponse {
    match req.method.as_str() {
        "health" => WsResponse::ok(&req.id, health_payload(state).await),
        "session.create" => {
            let session = state.sessions.create().await;
            owned.created(session.id());
            WsResponse::ok(&req.id, session_json(&session).await)
        }
        "chat" => {
            let params: ChatParams = match serde_json::from_value(req.params) {
                Ok(p) => p,
                Err(_) => return WsResponse::err(&req.id, "invalid chat params"),
            };
            let session = match params.session_id.as_deref() {
                Some(id) => match state.sessions.require(id).await {
                    Ok(session) => {
                        owned.joined(session.id());
                        session
                    }
                    Err(e) => return WsResponse::err(&req.id, e.to_string()),
                },
                None => {
                    let session = state.sessions.create().await;
                    owned.created(session.id());
                    session
                }
            };
            match chat_turn(&session, &params.message).await {
                Ok(reply) => WsResponse::ok(
                    &req.id,
                    json!({ "sessionId": session.id(), "reply": reply }),
                ),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        other => WsResponse::err(&req.id, format!("unknown method: {}", other)),
    }
}
