use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, UserLite};

/// Events sent over the WebSocket gateway. The gateway is an advisory
/// change-notification hook: clients re-fetch through the REST API, so a
/// dropped event is never a correctness problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user: UserLite },

    /// A new message was posted to a chat
    MessageCreate {
        id: Uuid,
        chat_id: Uuid,
        sender_id: Uuid,
        content: String,
        seq: i64,
        timestamp: DateTime<Utc>,
    },

    /// A participant's typing slot changed
    TypingUpdate {
        chat_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// A participant advanced their read pointer
    ReadReceiptUpdate {
        chat_id: Uuid,
        user_id: Uuid,
        last_read_message_id: Uuid,
        last_read_at: DateTime<Utc>,
    },

    /// A notification was created for this connection's user
    NotificationCreate { notification: Notification },
}

impl GatewayEvent {
    /// Returns the chat id if this event is scoped to a specific chat.
    /// Events that return `None` are delivered regardless of subscriptions.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { chat_id, .. }
            | Self::TypingUpdate { chat_id, .. }
            | Self::ReadReceiptUpdate { chat_id, .. } => Some(*chat_id),
            // Ready and NotificationCreate are connection/user scoped
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to chat-scoped events. The server only forwards
    /// chat-scoped events for chats the client has subscribed to.
    Subscribe { chat_ids: Vec<Uuid> },
}
