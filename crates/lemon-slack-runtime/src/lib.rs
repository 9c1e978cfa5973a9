//! Slack runtime for the Lemon assistant bot.
//!
//! Receives Slack events over Socket Mode or the HTTP Events API, reads the
//! thread (or channel history) that triggered the bot, asks the configured
//! language model for a reply and posts it back to Slack.

mod slack_helpers;
mod slack_runtime;

pub use slack_helpers::normalize_optional_setting;

pub use slack_runtime::{
    build_slack_events_router, build_thread_prompt, fold_attachment_text, role_for_author,
    run_slack_runtime, ReplyError, SlackAttachment, SlackHandlerContext, SlackRuntimeConfig,
    SlackTransport, ConversationFetchError, TranscriptEntry,
};
