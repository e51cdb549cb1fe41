use crate::types::{HistoryMessage, Turn, TurnRole};
use tracing::info;

/// Sliding window over the raw history: the newest `max` entries survive,
/// oldest are dropped first.
pub fn truncate(history: &[HistoryMessage], max: usize) -> &[HistoryMessage] {
    if history.len() > max {
        info!(max, "Conversation history truncated");
        &history[history.len() - max..]
    } else {
        history
    }
}

/// Convert frontend history entries into transcript turns. Role "user"
/// maps to a user turn; anything else (including "assistant") becomes a
/// model turn. Missing content becomes an empty string. Never fails.
pub fn adapt(history: &[HistoryMessage]) -> Vec<Turn> {
    history
        .iter()
        .map(|message| {
            let role = if message.role == "user" {
                TurnRole::User
            } else {
                TurnRole::Model
            };
            Turn::text(role, message.content.clone().unwrap_or_default())
        })
        .collect()
}
