use crate::models::{AppendedMessage, ConversationRow, MessageRow, UserRow};
use crate::{Database, format_timestamp, now, parse_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::models::{DEFAULT_CONVERSATION_TITLE, Role};
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, username, email, password, created_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (username, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (username, email, password_hash, format_timestamp(now())),
            )?;
            let id = tx.last_insert_rowid();
            query_user(tx, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", &username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", &email))
    }

    // -- Conversations --

    pub fn create_conversation(&self, owner_id: i64) -> Result<ConversationRow> {
        self.with_tx(|tx| {
            let ts = format_timestamp(now());
            tx.execute(
                "INSERT INTO conversations (user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                (owner_id, DEFAULT_CONVERSATION_TITLE, &ts),
            )?;
            let id = tx.last_insert_rowid();
            query_conversation(tx, id, owner_id)?
                .ok_or_else(|| anyhow::anyhow!("Conversation {} vanished after insert", id))
        })
    }

    /// Look up a conversation by id, scoped to its owner. A conversation owned
    /// by someone else is reported exactly like a missing one.
    pub fn get_conversation(&self, id: i64, owner_id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id, owner_id))
    }

    /// Most recently active first.
    pub fn list_conversations(&self, owner_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE user_id = ?1
                 ORDER BY updated_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a turn, bump the conversation's `updated_at`, and count its
    /// messages, all in one transaction.
    ///
    /// `created_at` is strictly greater than every earlier message in the
    /// conversation, even if the wall clock stalls or steps backwards.
    pub fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<AppendedMessage> {
        self.with_tx(|tx| insert_message(tx, conversation_id, role, content))
    }

    /// Append the assistant's turn and, if given, set the conversation title
    /// in the same transaction.
    pub fn append_reply(
        &self,
        conversation_id: i64,
        content: &str,
        title: Option<&str>,
    ) -> Result<AppendedMessage> {
        self.with_tx(|tx| {
            let appended = insert_message(tx, conversation_id, Role::Assistant, content)?;
            if let Some(title) = title {
                tx.execute(
                    "UPDATE conversations SET title = ?1 WHERE id = ?2",
                    (title, conversation_id),
                )?;
            }
            Ok(appended)
        })
    }

    /// Oldest first. This is the order the context builder replays.
    pub fn get_messages(&self, conversation_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch messages for a set of conversations, oldest first within each.
    pub fn get_messages_for_conversations(
        &self,
        conversation_ids: &[i64],
    ) -> Result<Vec<MessageRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id IN ({})
                 ORDER BY conversation_id, created_at ASC, id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(conversation_ids), map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    role: Role,
    content: &str,
) -> Result<AppendedMessage> {
    let last: Option<String> = conn
        .query_row(
            "SELECT created_at FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            [conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    let last = last.as_deref().map(parse_timestamp).transpose()?;
    let ts = next_timestamp(last, now());

    conn.execute(
        "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        (conversation_id, role.as_str(), content, format_timestamp(ts)),
    )?;
    let id = conn.last_insert_rowid();

    touch(conn, conversation_id, ts)?;

    let count = count_messages(conn, conversation_id)?;
    let row = conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        [id],
        map_message,
    )?;

    Ok(AppendedMessage { row, count })
}

/// Next message timestamp: now, unless that would not advance past `last`.
fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if last >= now => last + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// `updated_at` only ever moves forward.
fn touch(conn: &Connection, id: i64, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
        (format_timestamp(at), id),
    )?;
    Ok(())
}

fn count_messages(conn: &Connection, conversation_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn query_user(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(
    conn: &Connection,
    id: i64,
    owner_id: i64,
) -> Result<Option<ConversationRow>> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1 AND user_id = ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id, owner_id], map_conversation).optional()?;
    Ok(row)
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
