//! Chat-completion provider clients used by the Lemon Slack bot.
mod anthropic;
mod openai;
mod provider;
mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{ModelRef, ModelRefParseError, Provider};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, LemonAiError, LlmClient, Message, MessageRole,
};
