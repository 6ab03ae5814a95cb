//! REST endpoints: bulk broadcast, single send, bulk mail, blacklist
//! passthrough, and liveness.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::dispatch::{BulkMailEngine, DispatchEngine};
use crate::error::{ConfigError, ValidationError};
use crate::phone::{normalize, PhoneNumber};
use crate::transport::{MessageTransport, SendOptions};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub transport: Arc<dyn MessageTransport>,
    pub dispatcher: Arc<DispatchEngine>,
    pub mail: Option<Arc<BulkMailEngine>>,
}

/// Build the API router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/broadcast", post(broadcast))
        .route("/api/send", post(send_single))
        .route("/api/mail/bulk", post(mail_bulk))
        .route("/api/mail/verify", get(mail_verify))
        .route("/api/blacklist", post(blacklist_add).get(blacklist_list))
        .route("/api/blacklist/{number}", delete(blacklist_remove))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bad_request(err: ValidationError) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}

// ── Broadcast ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    #[serde(default)]
    numbers: Vec<String>,
    /// Single body, kept for convenience alongside `messages`.
    message: Option<String>,
    #[serde(default)]
    messages: Vec<String>,
}

impl BroadcastRequest {
    fn payloads(&self) -> Vec<String> {
        let mut payloads: Vec<String> = Vec::new();
        if let Some(ref message) = self.message {
            if !message.trim().is_empty() {
                payloads.push(message.clone());
            }
        }
        payloads.extend(
            self.messages
                .iter()
                .filter(|m| !m.trim().is_empty())
                .cloned(),
        );
        payloads
    }
}

#[derive(Debug, Serialize)]
struct BroadcastResponse {
    accepted: usize,
    invalid: Vec<String>,
}

/// POST /api/broadcast
///
/// Validates and partitions the raw identifiers, answers immediately with
/// the accepted count and the invalid list, and runs the dispatch loop on
/// a background task.
async fn broadcast(
    State(state): State<ApiState>,
    Json(req): Json<BroadcastRequest>,
) -> impl IntoResponse {
    if req.numbers.is_empty() {
        return bad_request(ValidationError::MissingField("numbers".into())).into_response();
    }
    let payloads = req.payloads();
    if payloads.is_empty() {
        return bad_request(ValidationError::MissingField("message".into())).into_response();
    }

    let mut seen: HashSet<PhoneNumber> = HashSet::new();
    let mut valid: Vec<PhoneNumber> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();
    for raw in &req.numbers {
        match normalize(raw) {
            Some(number) => {
                if seen.insert(number.clone()) {
                    valid.push(number);
                }
            }
            None => invalid.push(raw.clone()),
        }
    }

    if valid.is_empty() {
        return bad_request(ValidationError::InvalidField {
            field: "numbers".into(),
            message: "no valid numbers in the list".into(),
        })
        .into_response();
    }

    let accepted = valid.len();
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        dispatcher.dispatch_bulk(&valid, &payloads, None).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(BroadcastResponse { accepted, invalid }),
    )
        .into_response()
}

// ── Single send ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendRequest {
    number: String,
    message: String,
    media_url: Option<String>,
}

/// POST /api/send — synchronous single-recipient send.
async fn send_single(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> impl IntoResponse {
    if req.message.trim().is_empty() {
        return bad_request(ValidationError::MissingField("message".into())).into_response();
    }
    let Some(number) = normalize(&req.number) else {
        return bad_request(ValidationError::InvalidField {
            field: "number".into(),
            message: format!("{} is not a valid number", req.number),
        })
        .into_response();
    };

    let options = SendOptions {
        media_url: req.media_url.clone(),
    };
    match state
        .transport
        .send_message(number.as_str(), &req.message, &options)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "sent", "number": number.as_str() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ── Mail ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MailBulkRequest {
    #[serde(default)]
    addresses: Vec<String>,
    subject: String,
    text: String,
    html: Option<String>,
}

fn mail_not_configured() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({ "error": ConfigError::MailNotConfigured.to_string() })),
    )
}

/// POST /api/mail/bulk — runs the full mail loop and returns the report.
async fn mail_bulk(
    State(state): State<ApiState>,
    Json(req): Json<MailBulkRequest>,
) -> impl IntoResponse {
    let Some(mail) = state.mail.clone() else {
        return mail_not_configured().into_response();
    };
    if req.addresses.is_empty() {
        return bad_request(ValidationError::MissingField("addresses".into())).into_response();
    }
    if req.subject.trim().is_empty() {
        return bad_request(ValidationError::MissingField("subject".into())).into_response();
    }
    if req.text.trim().is_empty() {
        return bad_request(ValidationError::MissingField("text".into())).into_response();
    }

    // The SMTP transport is blocking; keep it off the async workers.
    let report = tokio::task::spawn_blocking(move || {
        mail.dispatch_mail(&req.addresses, &req.subject, &req.text, req.html.as_deref())
    })
    .await;

    match report {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("mail task failed: {e}") })),
        )
            .into_response(),
    }
}

/// GET /api/mail/verify — SMTP connectivity self-test, no send.
async fn mail_verify(State(state): State<ApiState>) -> impl IntoResponse {
    let Some(mail) = state.mail.clone() else {
        return mail_not_configured().into_response();
    };

    let result = tokio::task::spawn_blocking(move || mail.verify()).await;
    match result {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok" })),
        )
            .into_response(),
        Ok(Err(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("verify task failed: {e}") })),
        )
            .into_response(),
    }
}

// ── Blacklist passthrough ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BlacklistRequest {
    number: String,
}

async fn blacklist_add(
    State(state): State<ApiState>,
    Json(req): Json<BlacklistRequest>,
) -> impl IntoResponse {
    match state.transport.blacklist_add(&req.number).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "added", "number": req.number })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn blacklist_remove(
    State(state): State<ApiState>,
    axum::extract::Path(number): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.transport.blacklist_remove(&number).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "removed", "number": number })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn blacklist_list(State(state): State<ApiState>) -> impl IntoResponse {
    match state.transport.blacklist_list().await {
        Ok(numbers) => (
            StatusCode::OK,
            Json(serde_json::json!({ "numbers": numbers })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ── Liveness ────────────────────────────────────────────────────────

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ── Tests ───────────────────────────────────────────────────────────
