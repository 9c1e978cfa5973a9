//! Decoding of Slack event callbacks and slash commands into bot triggers.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::slack_helpers::slack_user_mention;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Which inbound traffic the bot reacts to.
pub(crate) struct SlackEventFilters {
    pub(crate) bot_user_id: String,
    pub(crate) trigger_keyword: Option<String>,
    pub(crate) trigger_reaction: Option<String>,
    pub(crate) slash_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackMessageTrigger {
    pub(crate) channel_id: String,
    pub(crate) user_id: String,
    pub(crate) text: String,
    pub(crate) ts: String,
    pub(crate) thread_ts: Option<String>,
}

impl SlackMessageTrigger {
    /// Root of the thread the message lives in; a top-level message starts its own.
    pub(crate) fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(self.ts.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackReactionTrigger {
    pub(crate) channel_id: String,
    pub(crate) user_id: String,
    pub(crate) reaction: String,
    pub(crate) item_ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackSlashCommand {
    pub(crate) command: String,
    pub(crate) text: String,
    pub(crate) user_id: String,
    pub(crate) channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackAssistantThread {
    pub(crate) user_id: Option<String>,
    pub(crate) channel_id: String,
    pub(crate) thread_ts: String,
    pub(crate) context_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlackInboundEvent {
    AppMention(SlackMessageTrigger),
    KeywordMessage(SlackMessageTrigger),
    DirectMessage(SlackMessageTrigger),
    ReactionAdded(SlackReactionTrigger),
    SlashCommand(SlackSlashCommand),
    AssistantThreadStarted(SlackAssistantThread),
    AssistantThreadContextChanged(SlackAssistantThread),
}

impl SlackInboundEvent {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::AppMention(_) => "app_mention",
            Self::KeywordMessage(_) => "keyword_message",
            Self::DirectMessage(_) => "direct_message",
            Self::ReactionAdded(_) => "reaction_added",
            Self::SlashCommand(_) => "slash_command",
            Self::AssistantThreadStarted(_) => "assistant_thread_started",
            Self::AssistantThreadContextChanged(_) => "assistant_thread_context_changed",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlackEventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event: Option<SlackEventPayload>,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reaction: Option<String>,
    #[serde(default)]
    item: Option<SlackReactionItem>,
    #[serde(default)]
    assistant_thread: Option<SlackAssistantThreadPayload>,
}

#[derive(Debug, Deserialize)]
struct SlackReactionItem {
    #[serde(rename = "type", default)]
    item_type: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackAssistantThreadPayload {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    context: Option<SlackAssistantThreadContext>,
}

#[derive(Debug, Deserialize)]
struct SlackAssistantThreadContext {
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Slash command fields, shared by the socket payload and the form body.
pub(crate) struct SlackSlashCommandPayload {
    #[serde(default)]
    pub(crate) command: String,
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) user_id: String,
    #[serde(default)]
    pub(crate) channel_id: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Maps an `event_callback` payload to a trigger, or `None` when the bot
/// should stay silent.
pub(crate) fn normalize_event_callback(
    payload: &Value,
    filters: &SlackEventFilters,
) -> Result<Option<SlackInboundEvent>> {
    let callback = serde_json::from_value::<SlackEventCallbackEnvelope>(payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }
    let Some(event) = callback.event else {
        return Ok(None);
    };
    tracing::trace!(
        event_id = callback.event_id.as_deref().unwrap_or("unknown"),
        event_type = %event.event_type,
        "normalizing slack event"
    );

    match event.event_type.as_str() {
        "assistant_thread_started" | "assistant_thread_context_changed" => {
            Ok(normalize_assistant_thread(event))
        }
        "reaction_added" => Ok(normalize_reaction(event, filters)),
        "app_mention" | "message" => Ok(normalize_message(event, filters)),
        _ => Ok(None),
    }
}

fn normalize_assistant_thread(event: SlackEventPayload) -> Option<SlackInboundEvent> {
    let thread = event.assistant_thread?;
    let assistant_thread = SlackAssistantThread {
        user_id: non_empty(thread.user_id),
        channel_id: non_empty(thread.channel_id)?,
        thread_ts: non_empty(thread.thread_ts)?,
        context_channel_id: thread
            .context
            .and_then(|context| non_empty(context.channel_id)),
    };
    if event.event_type == "assistant_thread_started" {
        Some(SlackInboundEvent::AssistantThreadStarted(assistant_thread))
    } else {
        Some(SlackInboundEvent::AssistantThreadContextChanged(
            assistant_thread,
        ))
    }
}

fn normalize_reaction(
    event: SlackEventPayload,
    filters: &SlackEventFilters,
) -> Option<SlackInboundEvent> {
    let trigger_reaction = filters.trigger_reaction.as_deref()?;
    let reaction = non_empty(event.reaction)?;
    if reaction != trigger_reaction {
        return None;
    }
    let user_id = non_empty(event.user)?;
    if user_id == filters.bot_user_id {
        return None;
    }
    let item = event.item?;
    if item.item_type.as_deref() != Some("message") {
        return None;
    }

    Some(SlackInboundEvent::ReactionAdded(SlackReactionTrigger {
        channel_id: non_empty(item.channel)?,
        user_id,
        reaction,
        item_ts: non_empty(item.ts)?,
    }))
}

fn normalize_message(
    event: SlackEventPayload,
    filters: &SlackEventFilters,
) -> Option<SlackInboundEvent> {
    if event.bot_id.is_some() || event.subtype.is_some() {
        return None;
    }
    let user_id = non_empty(event.user)?;
    if user_id == filters.bot_user_id {
        return None;
    }

    let trigger = SlackMessageTrigger {
        channel_id: non_empty(event.channel)?,
        user_id,
        text: event.text.unwrap_or_default(),
        ts: non_empty(event.ts)?,
        thread_ts: non_empty(event.thread_ts),
    };

    if event.event_type == "app_mention" {
        return Some(SlackInboundEvent::AppMention(trigger));
    }
    if event.channel_type.as_deref() == Some("im") {
        return Some(SlackInboundEvent::DirectMessage(trigger));
    }

    // Channel messages that mention the bot also arrive as `app_mention`.
    if trigger
        .text
        .contains(&slack_user_mention(&filters.bot_user_id))
    {
        return None;
    }
    let keyword = filters.trigger_keyword.as_deref()?;
    if trigger.text.contains(keyword) {
        return Some(SlackInboundEvent::KeywordMessage(trigger));
    }
    None
}

pub(crate) fn normalize_slash_command(
    payload: SlackSlashCommandPayload,
    filters: &SlackEventFilters,
) -> Option<SlackInboundEvent> {
    let expected = filters.slash_command.as_deref()?;
    let expected = expected.trim().trim_start_matches('/');
    let command = payload.command.trim();
    if expected.is_empty() || command.trim_start_matches('/') != expected {
        return None;
    }
    if payload.user_id.trim().is_empty() || payload.channel_id.trim().is_empty() {
        return None;
    }

    Some(SlackInboundEvent::SlashCommand(SlackSlashCommand {
        command: command.to_string(),
        text: payload.text.trim().to_string(),
        user_id: payload.user_id.trim().to_string(),
        channel_id: payload.channel_id.trim().to_string(),
    }))
}
