use clap::{Parser, ValueEnum};
use lemon_slack_runtime::SlackTransport;

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str =
    "あなたはSlackで返信する親切なAI「レモンちゃん」です。語尾はにゃをつけて返信しましょう！";

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSlackTransport {
    Socket,
    Http,
}

impl From<CliSlackTransport> for SlackTransport {
    fn from(value: CliSlackTransport) -> Self {
        match value {
            CliSlackTransport::Socket => SlackTransport::Socket,
            CliSlackTransport::Http => SlackTransport::Http,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "lemon-bot",
    about = "Slack bot that answers threads with an LLM using the whole conversation as context",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "LEMON_TRANSPORT",
        value_enum,
        default_value = "http",
        help = "How Slack delivers events: socket (Socket Mode) or http (Events API)."
    )]
    pub transport: CliSlackTransport,

    #[arg(
        long,
        env = "LEMON_MODEL",
        default_value = "openai/gpt-4.1-nano",
        help = "Model in provider/model format. Supported providers: openai, anthropic."
    )]
    pub model: String,

    #[arg(
        long = "system-prompt",
        env = "LEMON_SYSTEM_PROMPT",
        default_value = DEFAULT_SYSTEM_PROMPT,
        help = "System prompt placed before the conversation transcript."
    )]
    pub system_prompt: String,

    #[arg(
        long = "max-tokens",
        env = "LEMON_MAX_TOKENS",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Optional cap on reply tokens."
    )]
    pub max_tokens: Option<u32>,

    #[arg(
        long = "slack-bot-token",
        env = "SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Bot token (xoxb-...) used for Web API calls."
    )]
    pub slack_bot_token: Option<String>,

    #[arg(
        long = "slack-app-token",
        env = "SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "App-level token (xapp-...) required by Socket Mode."
    )]
    pub slack_app_token: Option<String>,

    #[arg(
        long = "slack-signing-secret",
        env = "SLACK_SIGNING_SECRET",
        hide_env_values = true,
        help = "Signing secret used to verify Events API requests."
    )]
    pub slack_signing_secret: Option<String>,

    #[arg(
        long = "slack-bot-user-id",
        env = "SLACK_BOT_USER_ID",
        help = "Bot user id. Resolved with auth.test when omitted."
    )]
    pub slack_bot_user_id: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "SLACK_API_BASE",
        default_value = "https://slack.com/api"
    )]
    pub slack_api_base: String,

    #[arg(
        long,
        env = "PORT",
        default_value_t = 3000,
        help = "Port for the Events API server."
    )]
    pub port: u16,

    #[arg(long = "bind-host", env = "LEMON_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: String,

    #[arg(
        long = "trigger-keyword",
        env = "LEMON_TRIGGER_KEYWORD",
        help = "Reply to channel messages containing this text."
    )]
    pub trigger_keyword: Option<String>,

    #[arg(
        long = "trigger-reaction",
        env = "LEMON_TRIGGER_REACTION",
        help = "Reply when this emoji reaction is added to a message."
    )]
    pub trigger_reaction: Option<String>,

    #[arg(
        long = "slash-command",
        env = "LEMON_SLASH_COMMAND",
        help = "Slash command that answers from recent channel history, e.g. /lemon."
    )]
    pub slash_command: Option<String>,

    #[arg(
        long = "history-limit",
        env = "LEMON_HISTORY_LIMIT",
        default_value_t = 20,
        value_parser = parse_positive_usize,
        help = "Channel messages read for slash command replies."
    )]
    pub history_limit: usize,

    #[arg(
        long = "replies-page-limit",
        env = "LEMON_REPLIES_PAGE_LIMIT",
        value_parser = clap::value_parser!(u32).range(1..=1000),
        help = "Page size requested from conversations.replies."
    )]
    pub replies_page_limit: Option<u32>,

    #[arg(
        long = "slack-request-timeout-ms",
        env = "LEMON_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64
    )]
    pub slack_request_timeout_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "LEMON_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "LEMON_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64
    )]
    pub slack_retry_base_delay_ms: u64,

    #[arg(
        long = "slack-reconnect-delay-ms",
        env = "LEMON_SLACK_RECONNECT_DELAY_MS",
        default_value_t = 3_000,
        value_parser = parse_positive_u64
    )]
    pub slack_reconnect_delay_ms: u64,

    #[arg(
        long = "slack-signature-max-skew-seconds",
        env = "LEMON_SLACK_SIGNATURE_MAX_SKEW_SECONDS",
        default_value_t = 300
    )]
    pub slack_signature_max_skew_seconds: u64,

    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(
        long = "openai-api-base",
        env = "OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_api_base: String,

    #[arg(long = "openai-organization", env = "OPENAI_ORGANIZATION")]
    pub openai_organization: Option<String>,

    #[arg(
        long = "anthropic-api-key",
        env = "ANTHROPIC_API_KEY",
        hide_env_values = true
    )]
    pub anthropic_api_key: Option<String>,

    #[arg(
        long = "anthropic-api-base",
        env = "ANTHROPIC_API_BASE",
        default_value = "https://api.anthropic.com/v1"
    )]
    pub anthropic_api_base: String,

    #[arg(
        long = "request-timeout-ms",
        env = "LEMON_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "Timeout for model provider requests."
    )]
    pub request_timeout_ms: u64,
}
