//! HTTP Events API transport: signed Slack requests in, immediate 200 out.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::net::TcpListener;

use super::slack_events::{
    normalize_event_callback, normalize_slash_command, SlackSlashCommandPayload,
};
use super::slack_handlers::{spawn_inbound_event, SlackHandlerContext};
use crate::slack_helpers::current_unix_timestamp_ms;

pub(crate) const SLACK_SIGNATURE_MAX_SKEW_SECONDS: u64 = 300;

#[derive(Clone)]
struct SlackWebhookState {
    context: Arc<SlackHandlerContext>,
    signing_secret: String,
    max_skew_seconds: u64,
}

/// Routes `POST /slack/events` and `GET /healthz`.
pub fn build_slack_events_router(
    context: Arc<SlackHandlerContext>,
    signing_secret: &str,
    max_skew_seconds: u64,
) -> Router {
    let state = SlackWebhookState {
        context,
        signing_secret: signing_secret.trim().to_string(),
        max_skew_seconds,
    };
    Router::new()
        .route("/slack/events", post(handle_slack_events))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

pub(crate) async fn run_slack_http_server(
    context: Arc<SlackHandlerContext>,
    signing_secret: &str,
    max_skew_seconds: u64,
    bind_addr: &str,
) -> Result<()> {
    if signing_secret.trim().is_empty() {
        bail!("slack http transport requires a signing secret");
    }
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve slack events server address")?;
    tracing::info!(addr = %local_addr, "slack events server listening");

    let app = build_slack_events_router(context, signing_secret, max_skew_seconds);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("slack events server shutdown requested");
        })
        .await
        .context("slack events server exited unexpectedly")
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

async fn handle_slack_events(
    State(state): State<SlackWebhookState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");
    let verified = validate_timestamp_skew(
        timestamp,
        current_unix_timestamp_ms(),
        state.max_skew_seconds,
    )
    .and_then(|()| verify_slack_v0_signature(&body, signature, timestamp, &state.signing_secret));
    if let Err(error) = verified {
        tracing::warn!(error = %format!("{error:#}"), "rejected slack request");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "slack request signature verification failed",
        );
    }

    let is_form = header_str(&headers, CONTENT_TYPE.as_str())
        .starts_with("application/x-www-form-urlencoded");
    if is_form {
        return handle_slash_command_form(&state, &body);
    }

    let payload = match serde_json::from_str::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "invalid slack event json");
            return error_response(
                StatusCode::BAD_REQUEST,
                "parse_failed",
                "invalid slack event payload",
            );
        }
    };

    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = payload
                .get("challenge")
                .and_then(Value::as_str)
                .unwrap_or_default();
            (StatusCode::OK, Json(json!({"challenge": challenge}))).into_response()
        }
        Some("event_callback") => {
            match normalize_event_callback(&payload, &state.context.settings.filters) {
                Ok(Some(event)) => spawn_inbound_event(state.context.clone(), event),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(error = %format!("{error:#}"), "ignored malformed slack event");
                }
            }
            StatusCode::OK.into_response()
        }
        other => {
            tracing::debug!(payload_type = other.unwrap_or("missing"), "ignored slack payload");
            StatusCode::OK.into_response()
        }
    }
}

fn handle_slash_command_form(state: &SlackWebhookState, body: &str) -> Response {
    let payload = match serde_urlencoded::from_str::<SlackSlashCommandPayload>(body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "invalid slack slash command form");
            return error_response(
                StatusCode::BAD_REQUEST,
                "parse_failed",
                "invalid slack slash command payload",
            );
        }
    };
    match normalize_slash_command(payload, &state.context.settings.filters) {
        Some(event) => spawn_inbound_event(state.context.clone(), event),
        None => tracing::debug!("ignored unconfigured slash command"),
    }
    StatusCode::OK.into_response()
}

pub(crate) fn verify_slack_v0_signature(
    payload: &str,
    signature: &str,
    timestamp: &str,
    secret: &str,
) -> Result<()> {
    let Some(digest_hex) = signature.strip_prefix("v0=") else {
        bail!("slack signature must use v0=<hex> format");
    };
    let signature_bytes = decode_hex(digest_hex)?;
    let signed_payload = format!("v0:{timestamp}:{payload}");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .context("failed to initialize slack signature verifier")?;
    mac.update(signed_payload.as_bytes());
    mac.verify_slice(&signature_bytes)
        .map_err(|_| anyhow!("slack signature verification failed"))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if trimmed.len() % 2 != 0 {
        bail!("signature digest must have an even number of hex characters");
    }

    let mut bytes = Vec::with_capacity(trimmed.len() / 2);
    let mut index = 0_usize;
    while index < trimmed.len() {
        let next = index.saturating_add(2);
        let chunk = trimmed
            .get(index..next)
            .ok_or_else(|| anyhow!("invalid utf-8 in signature digest"))?;
        let byte = u8::from_str_radix(chunk, 16)
            .with_context(|| format!("invalid hex byte '{chunk}' in signature digest"))?;
        bytes.push(byte);
        index = next;
    }
    Ok(bytes)
}

pub(crate) fn validate_timestamp_skew(
    timestamp: &str,
    now_unix_ms: u64,
    max_skew_seconds: u64,
) -> Result<()> {
    let timestamp_seconds = timestamp
        .trim()
        .parse::<u64>()
        .with_context(|| format!("invalid slack request timestamp '{timestamp}'"))?;
    if max_skew_seconds == 0 {
        return Ok(());
    }
    let skew = (now_unix_ms / 1_000).abs_diff(timestamp_seconds);
    if skew > max_skew_seconds {
        bail!("slack request timestamp skew {skew}s exceeds {max_skew_seconds}s");
    }
    Ok(())
}
