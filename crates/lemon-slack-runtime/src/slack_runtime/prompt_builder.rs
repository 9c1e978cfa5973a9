use lemon_ai::{Message, MessageRole};

use super::thread_fetcher::TranscriptEntry;

/// Messages written by the triggering user are `user` turns; everyone else,
/// the bot and other humans alike, is treated as `assistant`.
pub fn role_for_author(author: Option<&str>, trigger_user: &str) -> MessageRole {
    if author == Some(trigger_user) {
        MessageRole::User
    } else {
        MessageRole::Assistant
    }
}

pub fn build_thread_prompt(
    system_prompt: &str,
    transcript: &[TranscriptEntry],
    trigger_user: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len().saturating_add(1));
    messages.push(Message::system(system_prompt));
    messages.extend(transcript.iter().map(|entry| Message {
        role: role_for_author(entry.author.as_deref(), trigger_user),
        content: entry.text.clone().unwrap_or_default(),
    }));
    messages
}
