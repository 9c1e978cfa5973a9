//! Slack runtime: configuration, handler context and the Socket Mode loop.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use lemon_ai::LlmClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::slack_helpers::normalize_optional_setting;

mod channel_history;
mod llm_gateway;
mod prompt_builder;
mod reply_error;
mod slack_api_client;
mod slack_events;
mod slack_handlers;
mod slack_webhook;
mod thread_fetcher;

pub use prompt_builder::{build_thread_prompt, role_for_author};
pub use reply_error::ReplyError;
pub use slack_api_client::SlackAttachment;
pub use slack_handlers::SlackHandlerContext;
pub use slack_webhook::build_slack_events_router;
pub use thread_fetcher::{fold_attachment_text, ConversationFetchError, TranscriptEntry};

use channel_history::DEFAULT_CHANNEL_HISTORY_LIMIT;
use llm_gateway::LlmGateway;
use slack_api_client::SlackApiClient;
use slack_events::{
    normalize_event_callback, normalize_slash_command, SlackEventFilters,
    SlackSlashCommandPayload,
};
use slack_handlers::{spawn_inbound_event, SlackReplySettings};
use slack_webhook::{run_slack_http_server, SLACK_SIGNATURE_MAX_SKEW_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How Slack delivers events to the bot.
pub enum SlackTransport {
    /// Outbound WebSocket opened with the app-level token.
    Socket,
    /// Slack POSTs signed requests to `/slack/events`.
    Http,
}

impl SlackTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Http => "http",
        }
    }
}

#[derive(Clone)]
/// Runtime configuration for the Slack bot.
pub struct SlackRuntimeConfig {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub transport: SlackTransport,
    pub api_base: String,
    pub bot_token: String,
    pub app_token: Option<String>,
    pub signing_secret: Option<String>,
    pub bot_user_id: Option<String>,
    pub bind_addr: String,
    pub trigger_keyword: Option<String>,
    pub trigger_reaction: Option<String>,
    pub slash_command: Option<String>,
    pub history_limit: usize,
    pub replies_page_limit: Option<u32>,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
    pub signature_max_skew_seconds: u64,
}

impl SlackRuntimeConfig {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: String::new(),
            temperature: 0.0,
            max_tokens: None,
            transport: SlackTransport::Http,
            api_base: "https://slack.com/api".to_string(),
            bot_token: bot_token.into(),
            app_token: None,
            signing_secret: None,
            bot_user_id: None,
            bind_addr: "0.0.0.0:3000".to_string(),
            trigger_keyword: None,
            trigger_reaction: None,
            slash_command: None,
            history_limit: DEFAULT_CHANNEL_HISTORY_LIMIT,
            replies_page_limit: None,
            request_timeout_ms: 10_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            reconnect_delay: Duration::from_secs(3),
            signature_max_skew_seconds: SLACK_SIGNATURE_MAX_SKEW_SECONDS,
        }
    }
}

impl SlackHandlerContext {
    /// Builds the Slack client and model gateway once. The bot user id is
    /// resolved with `auth.test` unless the config already carries one.
    pub async fn from_config(config: &SlackRuntimeConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            bail!("slack bot token is required");
        }
        let slack = SlackApiClient::new(
            config.api_base.clone(),
            config.app_token.clone().unwrap_or_default(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;

        let bot_user_id = match normalize_optional_setting(config.bot_user_id.as_deref()) {
            Some(user_id) => user_id,
            None => slack
                .resolve_bot_user_id()
                .await
                .context("failed to resolve slack bot user id")?,
        };
        tracing::info!(bot_user_id = %bot_user_id, "slack bot identity resolved");

        let settings = SlackReplySettings {
            system_prompt: config.system_prompt.clone(),
            filters: SlackEventFilters {
                bot_user_id,
                trigger_keyword: normalize_optional_setting(config.trigger_keyword.as_deref()),
                trigger_reaction: normalize_optional_setting(config.trigger_reaction.as_deref())
                    .map(|reaction| reaction.trim_matches(':').to_string()),
                slash_command: normalize_optional_setting(config.slash_command.as_deref()),
            },
            history_limit: config.history_limit.max(1),
            replies_page_limit: config.replies_page_limit,
        };
        let gateway = LlmGateway::new(
            config.client.clone(),
            config.model.clone(),
            config.temperature,
            config.max_tokens,
        );

        Ok(Self {
            slack,
            gateway,
            settings,
        })
    }
}

/// Starts the configured transport and runs until Ctrl-C.
pub async fn run_slack_runtime(config: SlackRuntimeConfig) -> Result<()> {
    let context = Arc::new(SlackHandlerContext::from_config(&config).await?);
    tracing::info!(
        transport = config.transport.as_str(),
        model = %config.model,
        "starting slack runtime"
    );

    match config.transport {
        SlackTransport::Socket => {
            let mut runtime = SlackSocketRuntime {
                context,
                reconnect_delay: config.reconnect_delay,
            };
            runtime.run().await
        }
        SlackTransport::Http => {
            let signing_secret = config.signing_secret.as_deref().unwrap_or_default();
            run_slack_http_server(
                context,
                signing_secret,
                config.signature_max_skew_seconds,
                &config.bind_addr,
            )
            .await
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackSocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketSessionExit {
    Shutdown,
    Disconnected,
}

struct SlackSocketRuntime {
    context: Arc<SlackHandlerContext>,
    reconnect_delay: Duration,
}

impl SlackSocketRuntime {
    async fn run(&mut self) -> Result<()> {
        loop {
            match self.context.slack.open_socket_connection().await {
                Ok(socket_url) => {
                    tracing::info!("slack socket mode connected");
                    match self.run_socket_session(&socket_url).await {
                        Ok(SocketSessionExit::Shutdown) => {
                            tracing::info!("slack socket mode shutdown requested");
                            return Ok(());
                        }
                        Ok(SocketSessionExit::Disconnected) => {
                            tracing::info!("slack socket mode disconnected; reconnecting");
                        }
                        Err(error) => {
                            tracing::warn!(error = %format!("{error:#}"), "slack socket session error");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        error = %format!("{error:#}"),
                        "failed to open slack socket connection"
                    );
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("slack socket mode shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<SocketSessionExit> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    return Ok(SocketSessionExit::Shutdown);
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(SocketSessionExit::Disconnected);
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    let Some(envelope) = parse_socket_envelope(message)? else {
                        continue;
                    };
                    // Slack redelivers anything not acked within 3 seconds.
                    if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                        ack_envelope(&mut sink, envelope_id).await?;
                    }
                    if let Some(exit) = self.handle_envelope(envelope) {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    fn handle_envelope(&self, envelope: SlackSocketEnvelope) -> Option<SocketSessionExit> {
        match envelope.envelope_type.as_str() {
            "hello" => tracing::debug!("slack socket mode hello received"),
            "disconnect" => {
                tracing::info!(
                    reason = envelope.reason.as_deref().unwrap_or("unspecified"),
                    "slack requested socket disconnect"
                );
                return Some(SocketSessionExit::Disconnected);
            }
            "events_api" => {
                match normalize_event_callback(&envelope.payload, &self.context.settings.filters) {
                    Ok(Some(event)) => spawn_inbound_event(self.context.clone(), event),
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(error = %format!("{error:#}"), "ignored malformed slack event");
                    }
                }
            }
            "slash_commands" => {
                match serde_json::from_value::<SlackSlashCommandPayload>(envelope.payload) {
                    Ok(payload) => {
                        if let Some(event) =
                            normalize_slash_command(payload, &self.context.settings.filters)
                        {
                            spawn_inbound_event(self.context.clone(), event);
                        }
                    }
                    Err(error) => tracing::warn!(%error, "ignored malformed slash command"),
                }
            }
            other => tracing::debug!(envelope_type = other, "ignored slack socket envelope"),
        }
        None
    }
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}
