use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use lemon_ai::{
    AnthropicClient, AnthropicConfig, LlmClient, ModelRef, OpenAiClient, OpenAiConfig, Provider,
};
use lemon_slack_runtime::{normalize_optional_setting, SlackRuntimeConfig, SlackTransport};

use crate::cli_args::Cli;

/// Rejects configurations that cannot start: missing tokens for the chosen
/// transport or a provider without its API key.
pub(crate) fn validate_cli(cli: &Cli) -> Result<ModelRef> {
    if normalize_optional_setting(cli.slack_bot_token.as_deref()).is_none() {
        bail!("--slack-bot-token (SLACK_BOT_TOKEN) is required");
    }
    match SlackTransport::from(cli.transport) {
        SlackTransport::Socket => {
            if normalize_optional_setting(cli.slack_app_token.as_deref()).is_none() {
                bail!("--slack-app-token (SLACK_APP_TOKEN) is required when --transport=socket");
            }
        }
        SlackTransport::Http => {
            if normalize_optional_setting(cli.slack_signing_secret.as_deref()).is_none() {
                bail!(
                    "--slack-signing-secret (SLACK_SIGNING_SECRET) is required when --transport=http"
                );
            }
        }
    }
    if cli.system_prompt.trim().is_empty() {
        bail!("--system-prompt must not be empty");
    }

    let model_ref = ModelRef::parse(&cli.model)
        .with_context(|| format!("failed to parse --model '{}'", cli.model))?;
    let has_key = match model_ref.provider {
        Provider::OpenAi => normalize_optional_setting(cli.openai_api_key.as_deref()).is_some(),
        Provider::Anthropic => {
            normalize_optional_setting(cli.anthropic_api_key.as_deref()).is_some()
        }
    };
    if !has_key {
        bail!(
            "missing API key for provider '{}'. Set {}",
            model_ref.provider,
            match model_ref.provider {
                Provider::OpenAi => "OPENAI_API_KEY or --openai-api-key",
                Provider::Anthropic => "ANTHROPIC_API_KEY or --anthropic-api-key",
            }
        );
    }
    Ok(model_ref)
}

pub(crate) fn build_llm_client(cli: &Cli, model_ref: &ModelRef) -> Result<Arc<dyn LlmClient>> {
    match model_ref.provider {
        Provider::OpenAi => {
            let client = OpenAiClient::new(OpenAiConfig {
                api_base: cli.openai_api_base.clone(),
                api_key: cli.openai_api_key.clone().unwrap_or_default(),
                organization: normalize_optional_setting(cli.openai_organization.as_deref()),
                request_timeout_ms: cli.request_timeout_ms,
            })
            .context("failed to create openai client")?;
            Ok(Arc::new(client))
        }
        Provider::Anthropic => {
            let client = AnthropicClient::new(AnthropicConfig {
                api_base: cli.anthropic_api_base.clone(),
                api_key: cli.anthropic_api_key.clone().unwrap_or_default(),
                request_timeout_ms: cli.request_timeout_ms,
            })
            .context("failed to create anthropic client")?;
            Ok(Arc::new(client))
        }
    }
}

pub(crate) fn build_runtime_config(cli: &Cli) -> Result<SlackRuntimeConfig> {
    let model_ref = validate_cli(cli)?;
    let client = build_llm_client(cli, &model_ref)?;
    tracing::info!(
        provider = %model_ref.provider,
        model = %model_ref.model,
        transport = SlackTransport::from(cli.transport).as_str(),
        "lemon bot configured"
    );

    let mut config = SlackRuntimeConfig::new(
        client,
        model_ref.model,
        cli.slack_bot_token.clone().unwrap_or_default(),
    );
    config.system_prompt = cli.system_prompt.clone();
    config.max_tokens = cli.max_tokens;
    config.transport = cli.transport.into();
    config.api_base = cli.slack_api_base.clone();
    config.app_token = normalize_optional_setting(cli.slack_app_token.as_deref());
    config.signing_secret = normalize_optional_setting(cli.slack_signing_secret.as_deref());
    config.bot_user_id = normalize_optional_setting(cli.slack_bot_user_id.as_deref());
    config.bind_addr = format!("{}:{}", cli.bind_host.trim(), cli.port);
    config.trigger_keyword = cli.trigger_keyword.clone();
    config.trigger_reaction = cli.trigger_reaction.clone();
    config.slash_command = cli.slash_command.clone();
    config.history_limit = cli.history_limit;
    config.replies_page_limit = cli.replies_page_limit;
    config.request_timeout_ms = cli.slack_request_timeout_ms;
    config.retry_max_attempts = cli.slack_retry_max_attempts;
    config.retry_base_delay_ms = cli.slack_retry_base_delay_ms;
    config.reconnect_delay = Duration::from_millis(cli.slack_reconnect_delay_ms);
    config.signature_max_skew_seconds = cli.slack_signature_max_skew_seconds;
    Ok(config)
}
