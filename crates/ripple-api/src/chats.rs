use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ripple_types::api::{
    ChatParticipantsResponse, CreateChatRequest, CreateChatResponse, MarkReadRequest,
    SendMessageRequest, SetTypingRequest, TypingResponse,
};
use ripple_types::events::GatewayEvent;

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState, with_db};

/// Resolves the unique chat for (requester, other), creating it on first
/// contact. Always returns the same chat id for a pair, whichever side
/// asks.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = with_db(state, move |db| {
        db.get_or_create_chat(user.id, req.other_user_id)
    })
    .await?;

    Ok(Json(CreateChatResponse { chat_id }))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = with_db(state, move |db| db.get_user_chats(user.id)).await?;
    Ok(Json(summaries))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = with_db(state, move |db| db.get_messages(user.id, chat_id)).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = with_db(state.clone(), move |db| {
        db.send_message(user.id, chat_id, &req.content)
    })
    .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message.id,
        chat_id: message.chat_id,
        sender_id: message.sender_id,
        content: message.content.clone(),
        seq: message.seq,
        timestamp: message.created_at,
    });

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = with_db(state.clone(), move |db| {
        db.mark_read(user.id, chat_id, req.message_id)
    })
    .await?;

    state.dispatcher.broadcast(GatewayEvent::ReadReceiptUpdate {
        chat_id: receipt.chat_id,
        user_id: receipt.user_id,
        last_read_message_id: receipt.last_read_message_id,
        last_read_at: receipt.last_read_at,
    });

    Ok(StatusCode::NO_CONTENT)
}

/// The counterpart's receipt, which the client needs to render seen
/// status on the requester's own messages.
pub async fn get_read_receipt(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = with_db(state, move |db| db.get_read_receipt(user.id, chat_id)).await?;
    Ok(Json(receipt))
}

/// Level-triggered typing signal. The client is responsible for clearing
/// it after local inactivity (~2s); the server never expires it.
pub async fn set_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SetTypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    with_db(state.clone(), move |db| {
        db.set_typing(user.id, chat_id, req.is_typing)
    })
    .await?;

    state.dispatcher.broadcast(GatewayEvent::TypingUpdate {
        chat_id,
        user_id: user.id,
        is_typing: req.is_typing,
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let typing = with_db(state, move |db| db.get_typing(user.id, chat_id)).await?;
    Ok(Json(TypingResponse { typing }))
}

pub async fn get_participants(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (me, other_user) = with_db(state, move |db| {
        db.get_chat_participants(user.id, chat_id)
    })
    .await?;

    Ok(Json(ChatParticipantsResponse {
        me,
        other_user,
    }))
}
