//! Reads a whole Slack thread into an ordered transcript.

use thiserror::Error;

use super::slack_api_client::{SlackApiClient, SlackAttachment, SlackMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One message of a thread or channel, reduced to who wrote it and what it says.
pub struct TranscriptEntry {
    pub author: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConversationFetchError {
    #[error("slack {operation} request failed: {reason}")]
    Request {
        operation: &'static str,
        reason: String,
    },
    #[error("slack conversations.replies reported more pages without a cursor after page {page}")]
    MissingCursor { page: usize },
}

impl ConversationFetchError {
    pub(crate) fn request(operation: &'static str, error: &anyhow::Error) -> Self {
        Self::Request {
            operation,
            reason: format!("{error:#}"),
        }
    }
}

/// Appends attachment text to a message body as `> `-quoted lines.
///
/// Each attachment contributes its `text`, or `fallback` when `text` is
/// absent or empty. The body is returned unchanged when no attachment
/// contributes anything.
pub fn fold_attachment_text(text: &str, attachments: &[SlackAttachment]) -> String {
    let quoted = attachments
        .iter()
        .filter_map(|attachment| {
            attachment
                .text
                .as_deref()
                .filter(|value| !value.is_empty())
                .or(attachment.fallback.as_deref())
        })
        .map(|value| {
            value
                .split('\n')
                .map(|line| format!("> {line}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n");

    if quoted.is_empty() {
        text.to_string()
    } else {
        format!("{text}\n{quoted}")
    }
}

pub(crate) fn transcript_entry_from_message(message: &SlackMessage) -> Option<TranscriptEntry> {
    let text = message.text.as_deref()?;
    Some(TranscriptEntry {
        author: message.user.clone(),
        text: Some(fold_attachment_text(text, &message.attachments)),
    })
}

/// Pages through `conversations.replies` until Slack reports no more pages.
///
/// Any failed page aborts the whole fetch; entries collected from earlier
/// pages are discarded.
pub(crate) async fn fetch_thread_transcript(
    client: &SlackApiClient,
    channel_id: &str,
    thread_ts: &str,
    page_limit: Option<u32>,
) -> Result<Vec<TranscriptEntry>, ConversationFetchError> {
    let mut transcript = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 0_usize;

    loop {
        page = page.saturating_add(1);
        let replies = match client
            .conversations_replies(channel_id, thread_ts, cursor.as_deref(), page_limit)
            .await
        {
            Ok(replies) => replies,
            Err(error) => {
                tracing::warn!(
                    channel = channel_id,
                    thread_ts,
                    page,
                    error = %format!("{error:#}"),
                    "failed to fetch slack thread replies"
                );
                return Err(ConversationFetchError::request("conversations.replies", &error));
            }
        };

        transcript.extend(
            replies
                .messages
                .iter()
                .filter_map(transcript_entry_from_message),
        );

        if !replies.has_more {
            break;
        }
        match replies
            .next_cursor
            .filter(|value| !value.trim().is_empty())
        {
            Some(next_cursor) => cursor = Some(next_cursor),
            None => {
                tracing::warn!(
                    channel = channel_id,
                    thread_ts,
                    page,
                    "slack reported more thread replies without a cursor"
                );
                return Err(ConversationFetchError::MissingCursor { page });
            }
        }
    }

    tracing::debug!(
        channel = channel_id,
        thread_ts,
        pages = page,
        entries = transcript.len(),
        "fetched slack thread transcript"
    );
    Ok(transcript)
}
