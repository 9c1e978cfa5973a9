use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ChatRequest, ChatResponse, ChatUsage, LemonAiError, LlmClient, Message, MessageRole};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

#[derive(Debug, Clone)]
/// Connection settings for the Anthropic Messages API.
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// Public struct `AnthropicClient` speaking `/messages`.
pub struct AnthropicClient {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, LemonAiError> {
        if config.api_key.trim().is_empty() {
            return Err(LemonAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.trim())
                .map_err(|e| LemonAiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            return base.to_string();
        }

        format!("{base}/messages")
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LemonAiError> {
        let body = build_messages_request_body(&request);
        let response = self
            .client
            .post(self.messages_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(LemonAiError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }
        parse_messages_response(&raw)
    }
}

fn build_messages_request_body(request: &ChatRequest) -> Value {
    let system = extract_system_text(&request.messages);
    let messages = to_anthropic_messages(&request.messages);

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if !system.is_empty() {
        body["system"] = json!(system);
    }

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

fn extract_system_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(|message| message.content.as_str())
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// The Messages API rejects empty text blocks, so blank turns are dropped.
fn to_anthropic_messages(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .filter(|message| !message.content.trim().is_empty())
            .map(|message| {
                json!({
                    "role": message.role.as_str(),
                    "content": [{
                        "type": "text",
                        "text": message.content,
                    }],
                })
            })
            .collect(),
    )
}

fn parse_messages_response(raw: &str) -> Result<ChatResponse, LemonAiError> {
    let parsed: AnthropicMessageResponse = serde_json::from_str(raw)?;

    let text = parsed
        .content
        .into_iter()
        .filter_map(|part| match part {
            AnthropicContent::Text { text } => Some(text),
            AnthropicContent::Other => None,
        })
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message::assistant(text),
        finish_reason: parsed.stop_reason,
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_messages_request_body, parse_messages_response};
    use crate::{ChatRequest, Message};

    #[test]
    fn unit_moves_system_prompt_to_top_level_field() {
        let body = build_messages_request_body(&ChatRequest {
            model: "claude-3-5-haiku-latest".to_string(),
            messages: vec![
                Message::system("you are lemon"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            max_tokens: None,
            temperature: Some(0.0),
        });

        assert_eq!(body["system"], "you are lemon");
        assert_eq!(body["max_tokens"], 4_096);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["content"][0]["text"], "hello");
    }

    #[test]
    fn regression_drops_blank_turns() {
        let body = build_messages_request_body(&ChatRequest {
            model: "claude".to_string(),
            messages: vec![Message::user("   "), Message::user("real question")],
            max_tokens: Some(256),
            temperature: None,
        });

        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("system").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn functional_parses_text_blocks_and_usage() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "にゃ"},
                {"type": "thinking", "thinking": "hidden"},
                {"type": "text", "text": "よろしくにゃ"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 11, "output_tokens": 4}
        })
        .to_string();

        let response = parse_messages_response(&raw).expect("parse response");
        assert_eq!(response.message.content, "にゃ\nよろしくにゃ");
        assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(response.usage.total_tokens, 15);
    }
}
