//! Recent channel history used as context for slash commands.

use super::slack_api_client::{SlackApiClient, SlackMessage};
use super::thread_fetcher::{transcript_entry_from_message, ConversationFetchError, TranscriptEntry};

pub(crate) const DEFAULT_CHANNEL_HISTORY_LIMIT: usize = 20;

/// A message posted by a person: has an author, no bot id and no subtype
/// (joins, topic changes, bot posts and edits all carry one).
pub(crate) fn is_human_message(message: &SlackMessage) -> bool {
    message
        .user
        .as_deref()
        .is_some_and(|user| !user.trim().is_empty())
        && message.bot_id.is_none()
        && message.subtype.is_none()
}

/// Returns the human messages among the latest `limit` channel messages,
/// oldest first.
pub(crate) async fn fetch_channel_transcript(
    client: &SlackApiClient,
    channel_id: &str,
    limit: usize,
) -> Result<Vec<TranscriptEntry>, ConversationFetchError> {
    let messages = client
        .conversations_history(channel_id, limit)
        .await
        .map_err(|error| {
            tracing::warn!(
                channel = channel_id,
                error = %format!("{error:#}"),
                "failed to fetch slack channel history"
            );
            ConversationFetchError::request("conversations.history", &error)
        })?;

    Ok(messages
        .iter()
        .rev()
        .filter(|message| is_human_message(message))
        .filter_map(transcript_entry_from_message)
        .collect())
}
