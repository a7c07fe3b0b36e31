//! One chat turn, end to end.
//!
//! Steps: resolve (or create) the conversation, append the user turn,
//! assemble context from the full history, call the model, append the
//! assistant turn, then update metadata (touch + first-turn title).
//!
//! Store work before and after the model call runs in two transactions;
//! nothing is held across the call itself. The user turn is committed before
//! the model sees the context, so ordering inside the conversation stays
//! strictly increasing however turns interleave.

use axum::{Extension, Json, extract::State};
use tracing::{Span, debug, field, info, warn};

use parley_types::api::{ChatRequest, ChatResponse};
use parley_types::models::{Role, User};

use crate::context::{build_context, derive_title};
use crate::conversations;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, blocking};

/// Prefix of the assistant reply stored when the model call fails.
pub const FAILURE_NOTICE_PREFIX: &str = "Sorry, I encountered an error: ";

pub async fn chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::InvalidArgument("Message must not be empty".into()));
    }

    let response = run_chat_turn(&state, &user, req.conversation_id, req.message).await?;
    Ok(Json(response))
}

#[tracing::instrument(
    name = "chat_turn",
    skip(state, user, message),
    fields(user_id = user.id, conversation_id = field::Empty)
)]
pub async fn run_chat_turn(
    state: &AppState,
    user: &User,
    conversation_id: Option<i64>,
    message: String,
) -> Result<ChatResponse, ApiError> {
    // Resolve conversation
    let db = state.clone();
    let owner_id = user.id;
    let conversation = blocking(move || match conversation_id {
        Some(id) => conversations::get_owned(&db.db, id, owner_id),
        None => conversations::create(&db.db, owner_id),
    })
    .await?;
    let conversation_id = conversation.id;
    Span::current().record("conversation_id", conversation_id);

    // Append user turn, then read back the history it now belongs to
    let db = state.clone();
    let text = message.clone();
    let (count_after_user_turn, history) = blocking(move || {
        let appended = db.db.append_message(conversation_id, Role::User, &text)?;
        let history = conversations::history(&db.db, conversation_id)?;
        Ok((appended.count, history))
    })
    .await?;
    debug!(count = count_after_user_turn, "User turn stored");

    // Assemble context and invoke the model
    let context = build_context(&history);
    let reply = match state.model.generate(&context).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Model call failed, storing failure notice: {}", e);
            format!("{FAILURE_NOTICE_PREFIX}{e}")
        }
    };

    // Append assistant turn and update metadata
    let title = derive_title(count_after_user_turn, &message);
    let db = state.clone();
    let stored_reply = reply.clone();
    let assistant = blocking(move || {
        let appended = db
            .db
            .append_reply(conversation_id, &stored_reply, title.as_deref())?;
        if let Some(title) = &title {
            info!("Titled conversation {}: {}", conversation_id, title);
        }
        Ok(appended.row)
    })
    .await?;

    Ok(ChatResponse {
        message: reply,
        conversation_id,
        message_id: assistant.id,
    })
}
