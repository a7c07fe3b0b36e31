//! Database row types. These map directly to SQLite rows and are converted
//! into `parley-types` models at the edge of this crate.

use anyhow::{Result, anyhow};
use parley_types::models::{Conversation, Message, User};

use crate::parse_timestamp;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    pub created_at: String,
}

impl UserRow {
    /// Drops the password digest.
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct ConversationRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            id: self.id,
            owner_id: self.user_id,
            title: self.title,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let role = self
            .role
            .parse()
            .map_err(|e| anyhow!("Corrupt message {}: {}", self.id, e))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content: self.content,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Result of appending one turn: the stored row plus the conversation's
/// message count as seen inside the same transaction.
pub struct AppendedMessage {
    pub row: MessageRow,
    pub count: usize,
}
