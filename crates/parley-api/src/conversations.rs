use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use parley_db::Database;
use parley_types::api::ConversationResponse;
use parley_types::models::{Conversation, Message};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, blocking};

// -- Repository operations --

pub fn create(db: &Database, owner_id: i64) -> Result<Conversation, ApiError> {
    let conversation = db.create_conversation(owner_id)?.into_conversation()?;
    info!("Created conversation {} for user {}", conversation.id, owner_id);
    Ok(conversation)
}

/// `NotFound` both when the id does not exist and when it belongs to
/// another user.
pub fn get_owned(
    db: &Database,
    conversation_id: i64,
    owner_id: i64,
) -> Result<Conversation, ApiError> {
    let row = db
        .get_conversation(conversation_id, owner_id)?
        .ok_or(ApiError::NotFound)?;
    Ok(row.into_conversation()?)
}

/// Oldest first.
pub fn history(db: &Database, conversation_id: i64) -> Result<Vec<Message>, ApiError> {
    let messages = db
        .get_messages(conversation_id)?
        .into_iter()
        .map(|row| row.into_message())
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(messages)
}

/// Every conversation of `owner_id`, most recently active first, each with
/// its full ordered history.
pub fn list_with_messages(
    db: &Database,
    owner_id: i64,
) -> Result<Vec<(Conversation, Vec<Message>)>, ApiError> {
    let conversations = db
        .list_conversations(owner_id)?
        .into_iter()
        .map(|row| row.into_conversation())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let ids: Vec<i64> = conversations.iter().map(|c| c.id).collect();
    let mut by_conversation: HashMap<i64, Vec<Message>> = HashMap::new();
    for row in db.get_messages_for_conversations(&ids)? {
        let message = row.into_message()?;
        by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message);
    }

    Ok(conversations
        .into_iter()
        .map(|c| {
            let messages = by_conversation.remove(&c.id).unwrap_or_default();
            (c, messages)
        })
        .collect())
}

// -- Handlers --

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let db = state.clone();
    let conversations = blocking(move || list_with_messages(&db.db, user.id)).await?;

    Ok(Json(
        conversations
            .into_iter()
            .map(|(c, messages)| ConversationResponse::new(c, messages))
            .collect(),
    ))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let db = state.clone();
    let conversation = blocking(move || create(&db.db, user.id)).await?;

    Ok(Json(ConversationResponse::new(conversation, vec![])))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let db = state.clone();
    let (conversation, messages) = blocking(move || {
        let conversation = get_owned(&db.db, conversation_id, user.id)?;
        let messages = history(&db.db, conversation.id)?;
        Ok((conversation, messages))
    })
    .await?;

    Ok(Json(ConversationResponse::new(conversation, messages)))
}
