use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ripple_types::models::Chat;

/// A chats row, including the two typing slots that never leave this crate
/// unprocessed. The slots replace a per-chat map keyed by user id: a chat
/// has exactly two participants, so two booleans are the whole state.
#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub other_user_id: Uuid,
    pub user_typing: bool,
    pub other_typing: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatRow {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_id == user_id || self.other_user_id == user_id
    }

    /// The other side of the conversation, for a known participant.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.user_id {
            Some(self.other_user_id)
        } else if user_id == self.other_user_id {
            Some(self.user_id)
        } else {
            None
        }
    }

    pub fn typing_map(&self) -> HashMap<Uuid, bool> {
        HashMap::from([
            (self.user_id, self.user_typing),
            (self.other_user_id, self.other_typing),
        ])
    }

    pub fn to_chat(&self) -> Chat {
        Chat {
            id: self.id,
            user_id: self.user_id,
            other_user_id: self.other_user_id,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: Uuid, b: Uuid) -> ChatRow {
        ChatRow {
            id: Uuid::new_v4(),
            user_id: a,
            other_user_id: b,
            user_typing: true,
            other_typing: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counterpart_resolves_both_sides() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = row(a, b);

        assert_eq!(chat.counterpart(a), Some(b));
        assert_eq!(chat.counterpart(b), Some(a));
        assert_eq!(chat.counterpart(Uuid::new_v4()), None);
    }

    #[test]
    fn typing_map_has_one_entry_per_participant() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let map = row(a, b).typing_map();

        assert_eq!(map.len(), 2);
        assert_eq!(map[&a], true);
        assert_eq!(map[&b], false);
    }
}
