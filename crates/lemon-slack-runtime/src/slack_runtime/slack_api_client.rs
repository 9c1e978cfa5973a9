//! Slack Web API client used by the thread fetcher, responders and socket loop.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::slack_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_slack,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
/// Legacy message attachment; only the text-bearing fields are read.
pub struct SlackAttachment {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SlackMessage {
    #[serde(default)]
    pub(crate) user: Option<String>,
    #[serde(default)]
    pub(crate) bot_id: Option<String>,
    #[serde(default)]
    pub(crate) subtype: Option<String>,
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Clone)]
pub(crate) struct SlackRepliesPage {
    pub(crate) messages: Vec<SlackMessage>,
    pub(crate) has_more: bool,
    pub(crate) next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SlackPostedMessage {
    pub(crate) channel: String,
    pub(crate) ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackSuggestedPrompt {
    pub(crate) title: String,
    pub(crate) message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationsResponse {
    ok: bool,
    #[serde(default)]
    messages: Option<Vec<SlackMessage>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<SlackResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAckResponse {
    ok: bool,
    error: Option<String>,
}

fn ensure_slack_ok(operation: &str, ok: bool, error: Option<String>) -> Result<()> {
    if !ok {
        bail!(
            "slack {operation} failed: {}",
            error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

#[derive(Clone)]
pub(crate) struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub(crate) fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("lemon-slack-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub(crate) async fn resolve_bot_user_id(&self) -> Result<String> {
        let response: SlackAuthTestResponse = self
            .request_json(
                "auth.test",
                || {
                    self.http
                        .post(format!("{}/auth.test", self.api_base))
                        .bearer_auth(&self.bot_token)
                },
            )
            .await?;
        ensure_slack_ok("auth.test", response.ok, response.error)?;

        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))
    }

    pub(crate) async fn open_socket_connection(&self) -> Result<String> {
        if self.app_token.is_empty() {
            bail!("slack socket mode requires an app-level token (xapp-...)");
        }
        let response: SlackOpenSocketResponse = self
            .request_json(
                "apps.connections.open",
                || {
                    self.http
                        .post(format!("{}/apps.connections.open", self.api_base))
                        .bearer_auth(&self.app_token)
                },
            )
            .await?;
        ensure_slack_ok("apps.connections.open", response.ok, response.error)?;

        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    pub(crate) async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackPostedMessage> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts.map(str::trim).filter(|value| !value.is_empty()) {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response: SlackChatMessageResponse = self
            .request_json(
                "chat.postMessage",
                || {
                    self.http
                        .post(format!("{}/chat.postMessage", self.api_base))
                        .bearer_auth(&self.bot_token)
                        .json(&payload)
                },
            )
            .await?;
        ensure_slack_ok("chat.postMessage", response.ok, response.error)?;

        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response
                .ts
                .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?,
        })
    }

    /// Reads one page of a thread. `ts` may be the thread root or any reply in it.
    pub(crate) async fn conversations_replies(
        &self,
        channel: &str,
        ts: &str,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<SlackRepliesPage> {
        let mut query = vec![
            ("channel", channel.to_string()),
            ("ts", ts.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response: SlackConversationsResponse = self
            .request_json(
                "conversations.replies",
                || {
                    self.http
                        .get(format!("{}/conversations.replies", self.api_base))
                        .bearer_auth(&self.bot_token)
                        .query(&query)
                },
            )
            .await?;
        ensure_slack_ok("conversations.replies", response.ok, response.error)?;

        let messages = response
            .messages
            .ok_or_else(|| anyhow!("slack conversations.replies did not return messages"))?;
        Ok(SlackRepliesPage {
            messages,
            has_more: response.has_more,
            next_cursor: response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor),
        })
    }

    /// Newest-first page of channel history.
    pub(crate) async fn conversations_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<SlackMessage>> {
        let query = [
            ("channel", channel.to_string()),
            ("limit", limit.max(1).to_string()),
        ];
        let response: SlackConversationsResponse = self
            .request_json(
                "conversations.history",
                || {
                    self.http
                        .get(format!("{}/conversations.history", self.api_base))
                        .bearer_auth(&self.bot_token)
                        .query(&query)
                },
            )
            .await?;
        ensure_slack_ok("conversations.history", response.ok, response.error)?;

        response
            .messages
            .ok_or_else(|| anyhow!("slack conversations.history did not return messages"))
    }

    pub(crate) async fn set_assistant_status(
        &self,
        channel: &str,
        thread_ts: &str,
        status: &str,
    ) -> Result<()> {
        let payload = json!({
            "channel_id": channel,
            "thread_ts": thread_ts,
            "status": status,
        });
        let response: SlackAckResponse = self
            .request_json(
                "assistant.threads.setStatus",
                || {
                    self.http
                        .post(format!("{}/assistant.threads.setStatus", self.api_base))
                        .bearer_auth(&self.bot_token)
                        .json(&payload)
                },
            )
            .await?;
        ensure_slack_ok("assistant.threads.setStatus", response.ok, response.error)
    }

    pub(crate) async fn set_suggested_prompts(
        &self,
        channel: &str,
        thread_ts: &str,
        title: Option<&str>,
        prompts: &[SlackSuggestedPrompt],
    ) -> Result<()> {
        let mut payload = json!({
            "channel_id": channel,
            "thread_ts": thread_ts,
            "prompts": prompts
                .iter()
                .map(|prompt| json!({"title": prompt.title, "message": prompt.message}))
                .collect::<Vec<_>>(),
        });
        if let Some(title) = title.map(str::trim).filter(|value| !value.is_empty()) {
            payload["title"] = Value::String(title.to_string());
        }

        let response: SlackAckResponse = self
            .request_json(
                "assistant.threads.setSuggestedPrompts",
                || {
                    self.http
                        .post(format!(
                            "{}/assistant.threads.setSuggestedPrompts",
                            self.api_base
                        ))
                        .bearer_auth(&self.bot_token)
                        .json(&payload)
                },
            )
            .await?;
        ensure_slack_ok(
            "assistant.threads.setSuggestedPrompts",
            response.ok,
            response.error,
        )
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header("x-lemon-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying slack api request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_slack(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}
