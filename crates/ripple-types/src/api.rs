use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserLite;

// -- JWT Claims --

/// Claims of the identity-provider-issued bearer token, shared between
/// ripple-api (REST middleware) and ripple-gateway (WebSocket Identify).
/// `sub` is the provider's stable subject, not a ripple user id; the
/// middleware resolves it to a user row before any handler runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
pub struct TypingResponse {
    pub typing: HashMap<Uuid, bool>,
}

#[derive(Debug, Serialize)]
pub struct ChatParticipantsResponse {
    pub me: UserLite,
    pub other_user: UserLite,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FollowStateResponse {
    pub following: bool,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailableResponse {
    pub available: bool,
}

// -- Posts & bookmarks --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub image_url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookmarkToggleResponse {
    pub bookmarked: bool,
}
