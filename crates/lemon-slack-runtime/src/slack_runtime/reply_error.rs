use lemon_ai::LemonAiError;
use thiserror::Error;

use super::thread_fetcher::ConversationFetchError;

#[derive(Debug, Error)]
/// Why a reply could not be generated. Each variant maps to its own message
/// for the Slack user.
pub enum ReplyError {
    #[error("failed to read slack conversation: {0}")]
    ConversationFetch(#[from] ConversationFetchError),
    #[error("thread contained no readable messages")]
    EmptyThread,
    #[error("channel history contained no messages from people")]
    NoHumanMessages,
    #[error("language model request failed: {0}")]
    Model(#[from] LemonAiError),
}

impl ReplyError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ConversationFetch(_) => "conversation_fetch_failed",
            Self::EmptyThread => "empty_thread",
            Self::NoHumanMessages => "no_human_messages",
            Self::Model(_) => "model_failed",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ConversationFetch(_) => {
                "Sorry, I couldn't read this conversation right now. Please try again in a moment."
            }
            Self::EmptyThread => "I couldn't find any messages in this thread to reply to.",
            Self::NoHumanMessages => {
                "I couldn't find any recent messages from people in this channel."
            }
            Self::Model(_) => {
                "Sorry, something went wrong while I was thinking. Please try again later."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lemon_ai::LemonAiError;

    use super::ReplyError;
    use crate::slack_runtime::thread_fetcher::ConversationFetchError;

    #[test]
    fn unit_each_failure_has_a_distinct_user_message() {
        let errors = [
            ReplyError::from(ConversationFetchError::MissingCursor { page: 2 }),
            ReplyError::EmptyThread,
            ReplyError::NoHumanMessages,
            ReplyError::from(LemonAiError::MissingApiKey),
        ];
        let mut messages = errors
            .iter()
            .map(ReplyError::user_message)
            .collect::<Vec<_>>();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());
        assert_eq!(errors[3].reason_code(), "model_failed");
    }
}
