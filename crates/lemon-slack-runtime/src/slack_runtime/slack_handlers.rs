//! Per-event reply flows: read the conversation, ask the model, post the answer.

use std::sync::Arc;

use anyhow::Result;
use lemon_ai::Message;

use super::channel_history::fetch_channel_transcript;
use super::llm_gateway::LlmGateway;
use super::prompt_builder::build_thread_prompt;
use super::reply_error::ReplyError;
use super::slack_api_client::{SlackApiClient, SlackSuggestedPrompt};
use super::slack_events::{
    SlackAssistantThread, SlackEventFilters, SlackInboundEvent, SlackMessageTrigger,
    SlackReactionTrigger, SlackSlashCommand,
};
use super::thread_fetcher::fetch_thread_transcript;
use crate::slack_helpers::{slack_user_mention, truncate_for_slack, SLACK_MESSAGE_MAX_CHARS};

pub(crate) const ASSISTANT_THINKING_STATUS: &str = "is thinking...";
pub(crate) const ASSISTANT_GREETING: &str =
    "Hi! I'm Lemon. Ask me anything, or pick one of the suggestions below.";
const SUGGESTED_PROMPTS_TITLE: &str = "Try asking";

#[derive(Debug, Clone)]
pub(crate) struct SlackReplySettings {
    pub(crate) system_prompt: String,
    pub(crate) filters: SlackEventFilters,
    pub(crate) history_limit: usize,
    pub(crate) replies_page_limit: Option<u32>,
}

/// Clients and settings shared by every spawned event task.
pub struct SlackHandlerContext {
    pub(crate) slack: SlackApiClient,
    pub(crate) gateway: LlmGateway,
    pub(crate) settings: SlackReplySettings,
}

fn default_suggested_prompts() -> Vec<SlackSuggestedPrompt> {
    vec![
        SlackSuggestedPrompt {
            title: "Summarize a thread".to_string(),
            message: "Can you summarize what we discussed so far?".to_string(),
        },
        SlackSuggestedPrompt {
            title: "Draft a reply".to_string(),
            message: "Help me write a friendly reply to my teammate.".to_string(),
        },
        SlackSuggestedPrompt {
            title: "Brainstorm".to_string(),
            message: "Give me three ideas for our next team lunch.".to_string(),
        },
    ]
}

/// Runs the event on its own task so the transport can keep reading.
pub(crate) fn spawn_inbound_event(context: Arc<SlackHandlerContext>, event: SlackInboundEvent) {
    tokio::spawn(async move {
        handle_inbound_event(&context, event).await;
    });
}

pub(crate) async fn handle_inbound_event(context: &SlackHandlerContext, event: SlackInboundEvent) {
    let kind = event.kind();
    tracing::info!(kind, "handling slack event");
    let result = match event {
        SlackInboundEvent::AppMention(trigger) | SlackInboundEvent::KeywordMessage(trigger) => {
            reply_to_thread_message(context, &trigger).await
        }
        SlackInboundEvent::DirectMessage(trigger) => reply_to_direct_message(context, &trigger).await,
        SlackInboundEvent::ReactionAdded(trigger) => reply_to_reaction(context, &trigger).await,
        SlackInboundEvent::SlashCommand(command) => reply_to_slash_command(context, &command).await,
        SlackInboundEvent::AssistantThreadStarted(thread) => {
            greet_assistant_thread(context, &thread).await
        }
        SlackInboundEvent::AssistantThreadContextChanged(thread) => {
            tracing::debug!(
                channel = %thread.channel_id,
                thread_ts = %thread.thread_ts,
                context_channel = thread.context_channel_id.as_deref().unwrap_or("none"),
                "assistant thread context changed"
            );
            Ok(())
        }
    };

    if let Err(error) = result {
        tracing::error!(kind, error = %format!("{error:#}"), "failed to deliver slack reply");
    }
}

/// Reads the thread rooted at `thread_ts` and asks the model for the next turn.
pub(crate) async fn generate_thread_reply(
    context: &SlackHandlerContext,
    channel_id: &str,
    thread_ts: &str,
    trigger_user: &str,
) -> Result<String, ReplyError> {
    let transcript = fetch_thread_transcript(
        &context.slack,
        channel_id,
        thread_ts,
        context.settings.replies_page_limit,
    )
    .await?;
    if transcript.is_empty() {
        return Err(ReplyError::EmptyThread);
    }

    let prompt = build_thread_prompt(&context.settings.system_prompt, &transcript, trigger_user);
    Ok(context.gateway.complete(prompt).await?)
}

pub(crate) async fn generate_channel_reply(
    context: &SlackHandlerContext,
    command: &SlackSlashCommand,
) -> Result<String, ReplyError> {
    let history = fetch_channel_transcript(
        &context.slack,
        &command.channel_id,
        context.settings.history_limit,
    )
    .await?;
    if history.is_empty() {
        return Err(ReplyError::NoHumanMessages);
    }

    let mut prompt = build_thread_prompt(&context.settings.system_prompt, &history, &command.user_id);
    if !command.text.is_empty() {
        prompt.push(Message::user(command.text.as_str()));
    }
    Ok(context.gateway.complete(prompt).await?)
}

pub(crate) fn render_reply_text(
    outcome: &Result<String, ReplyError>,
    mention_user: Option<&str>,
) -> String {
    let body = match outcome {
        Ok(reply) => reply.as_str(),
        Err(error) => error.user_message(),
    };
    let text = match mention_user {
        Some(user_id) => format!("{} {body}", slack_user_mention(user_id)),
        None => body.to_string(),
    };
    truncate_for_slack(&text, SLACK_MESSAGE_MAX_CHARS)
}

fn log_reply_failure(kind: &str, channel_id: &str, outcome: &Result<String, ReplyError>) {
    if let Err(error) = outcome {
        tracing::warn!(
            kind,
            channel = channel_id,
            reason_code = error.reason_code(),
            error = %error,
            "could not generate reply"
        );
    }
}

async fn post_reply(
    context: &SlackHandlerContext,
    channel_id: &str,
    text: &str,
    thread_ts: Option<&str>,
) -> Result<()> {
    let posted = context
        .slack
        .post_message(channel_id, text, thread_ts)
        .await?;
    tracing::info!(
        channel = %posted.channel,
        ts = %posted.ts,
        thread_ts = thread_ts.unwrap_or("none"),
        "posted slack reply"
    );
    Ok(())
}

async fn reply_to_thread_message(
    context: &SlackHandlerContext,
    trigger: &SlackMessageTrigger,
) -> Result<()> {
    let thread_ts = trigger.thread_root();
    let outcome =
        generate_thread_reply(context, &trigger.channel_id, thread_ts, &trigger.user_id).await;
    log_reply_failure("thread", &trigger.channel_id, &outcome);
    let text = render_reply_text(&outcome, Some(&trigger.user_id));
    post_reply(context, &trigger.channel_id, &text, Some(thread_ts)).await
}

async fn reply_to_direct_message(
    context: &SlackHandlerContext,
    trigger: &SlackMessageTrigger,
) -> Result<()> {
    // Only assistant threads accept a status; plain DMs have no thread_ts.
    if let Some(thread_ts) = trigger.thread_ts.as_deref() {
        if let Err(error) = context
            .slack
            .set_assistant_status(&trigger.channel_id, thread_ts, ASSISTANT_THINKING_STATUS)
            .await
        {
            tracing::debug!(error = %format!("{error:#}"), "assistant status not set");
        }
    }

    let outcome = generate_thread_reply(
        context,
        &trigger.channel_id,
        trigger.thread_root(),
        &trigger.user_id,
    )
    .await;
    log_reply_failure("direct_message", &trigger.channel_id, &outcome);
    let text = render_reply_text(&outcome, None);
    post_reply(
        context,
        &trigger.channel_id,
        &text,
        trigger.thread_ts.as_deref(),
    )
    .await
}

async fn reply_to_reaction(
    context: &SlackHandlerContext,
    trigger: &SlackReactionTrigger,
) -> Result<()> {
    tracing::debug!(reaction = %trigger.reaction, "trigger reaction added");
    let outcome =
        generate_thread_reply(context, &trigger.channel_id, &trigger.item_ts, &trigger.user_id)
            .await;
    log_reply_failure("reaction", &trigger.channel_id, &outcome);
    let text = render_reply_text(&outcome, Some(&trigger.user_id));
    post_reply(context, &trigger.channel_id, &text, Some(&trigger.item_ts)).await
}

async fn reply_to_slash_command(
    context: &SlackHandlerContext,
    command: &SlackSlashCommand,
) -> Result<()> {
    tracing::debug!(command = %command.command, "slash command received");
    let outcome = generate_channel_reply(context, command).await;
    log_reply_failure("slash_command", &command.channel_id, &outcome);
    let text = render_reply_text(&outcome, Some(&command.user_id));
    post_reply(context, &command.channel_id, &text, None).await
}

async fn greet_assistant_thread(
    context: &SlackHandlerContext,
    thread: &SlackAssistantThread,
) -> Result<()> {
    tracing::debug!(
        user = thread.user_id.as_deref().unwrap_or("unknown"),
        context_channel = thread.context_channel_id.as_deref().unwrap_or("none"),
        "assistant thread started"
    );
    post_reply(
        context,
        &thread.channel_id,
        ASSISTANT_GREETING,
        Some(&thread.thread_ts),
    )
    .await?;
    context
        .slack
        .set_suggested_prompts(
            &thread.channel_id,
            &thread.thread_ts,
            Some(SUGGESTED_PROMPTS_TITLE),
            &default_suggested_prompts(),
        )
        .await
}
