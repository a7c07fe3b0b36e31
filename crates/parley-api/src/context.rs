//! Turning a stored message log into model context, and naming conversations.

use parley_types::models::{Message, Turn};

/// Characters of the first user message kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

/// Project the full history, oldest first, into model turns. Nothing is
/// dropped, summarized or reordered.
pub fn build_context(messages: &[Message]) -> Vec<Turn> {
    messages
        .iter()
        .map(|m| Turn {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// Title for a conversation, or `None` if it keeps its current one.
///
/// `message_count` is the conversation's size right after the new user turn
/// was appended; a title is produced only when that turn is the very first.
/// Text longer than [`TITLE_MAX_CHARS`] is cut there and gets `"..."`
/// appended, so a marked title is 53 characters.
pub fn derive_title(message_count: usize, new_user_text: &str) -> Option<String> {
    if message_count != 1 {
        return None;
    }

    if new_user_text.chars().count() > TITLE_MAX_CHARS {
        let mut title: String = new_user_text.chars().take(TITLE_MAX_CHARS).collect();
        title.push_str(TITLE_ELLIPSIS);
        Some(title)
    } else {
        Some(new_user_text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::models::Role;

    fn message(id: i64, role: Role, content: &str) -> Message {
        Message {
            id,
            conversation_id: 1,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn context_replays_whole_history_in_order() {
        let history = vec![
            message(1, Role::User, "hi"),
            message(2, Role::Assistant, "hello"),
            message(3, Role::User, "how are you?"),
        ];
        let turns = build_context(&history);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "hello");
        assert_eq!(turns[2].content, "how are you?");
    }

    #[test]
    fn empty_history_gives_empty_context() {
        assert!(build_context(&[]).is_empty());
    }

    #[test]
    fn long_first_message_is_truncated_and_marked() {
        let text = "a".repeat(80);
        let title = derive_title(1, &text).unwrap();
        assert_eq!(title, format!("{}...", "a".repeat(50)));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn short_first_message_is_kept() {
        let text = "Hello there, how are you?";
        assert_eq!(derive_title(1, text).as_deref(), Some(text));

        let thirty = "x".repeat(30);
        assert_eq!(derive_title(1, &thirty), Some(thirty.clone()));
    }

    #[test]
    fn exactly_fifty_chars_has_no_marker() {
        let text = "b".repeat(50);
        assert_eq!(derive_title(1, &text), Some(text.clone()));
    }

    #[test]
    fn later_turns_never_retitle() {
        assert_eq!(derive_title(0, "hello"), None);
        assert_eq!(derive_title(2, "hello"), None);
        assert_eq!(derive_title(3, "hello"), None);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(60);
        let title = derive_title(1, &text).unwrap();
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }
}
