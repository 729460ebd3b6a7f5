use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub image: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Minimal user projection embedded in chat summaries, search results
/// and notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLite {
    pub id: Uuid,
    pub username: String,
    pub image: String,
}

/// A conversation between exactly two users. `user_id` is the creator's
/// slot; lookup is always symmetric over the unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub other_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// A user's furthest-read pointer into a chat's message sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub last_read_message_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

/// Read-state of a chat's most recent message, derived from the
/// counterpart's read receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageRead {
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// One entry of the chat overview: the chat, the counterpart, the latest
/// message and the viewer's unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat: Chat,
    pub other_user: UserLite,
    pub last_message: Option<Message>,
    pub unread_count: u64,
    pub last_message_read: LastMessageRead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub image_url: String,
    pub caption: Option<String>,
    pub like_count: u64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub sender: UserLite,
    pub kind: NotificationKind,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
