use std::sync::Arc;

use lemon_ai::{ChatRequest, LemonAiError, LlmClient, Message};

pub(crate) const EMPTY_REPLY_FALLBACK: &str =
    "I couldn't come up with a reply for this conversation.";

#[derive(Clone)]
/// Single chat-completion call with a fixed model and sampling temperature.
pub(crate) struct LlmGateway {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmGateway {
    pub(crate) fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub(crate) async fn complete(&self, messages: Vec<Message>) -> Result<String, LemonAiError> {
        let turns = messages.len();
        let response = self
            .client
            .complete(ChatRequest {
                model: self.model.clone(),
                messages,
                max_tokens: self.max_tokens,
                temperature: Some(self.temperature),
            })
            .await?;

        tracing::debug!(
            model = %self.model,
            turns,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "model reply received"
        );

        let reply = response.message.content.trim();
        if reply.is_empty() {
            return Ok(EMPTY_REPLY_FALLBACK.to_string());
        }
        Ok(reply.to_string())
    }
}
