use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use ripple_types::models::{ChatSummary, LastMessageRead, Message, ReadReceipt, UserLite};

use super::users::{query_user_lite, user_exists};
use super::{ts_col, uuid_col};
use crate::models::ChatRow;
use crate::pair::ChatPair;
use crate::{Database, StoreError, StoreResult};

impl Database {
    /// Returns the chat between the requester and `other`, creating it if
    /// absent. Symmetric: (A, B) and (B, A) always resolve to the same row,
    /// and the unique pair index means concurrent calls can never commit a
    /// second chat for the same pair.
    pub fn get_or_create_chat(&self, requester: Uuid, other: Uuid) -> StoreResult<Uuid> {
        let pair = ChatPair::new(requester, other).ok_or_else(|| {
            StoreError::Validation("cannot start a chat with yourself".to_string())
        })?;

        self.with_tx(|tx| {
            if !user_exists(tx, other)? {
                return Err(StoreError::NotFound("user"));
            }

            if let Some(existing) = query_chat_by_pair(tx, &pair)? {
                return Ok(existing.id);
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO chats (id, user_id, other_user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    requester.to_string(),
                    other.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(id)
        })
    }

    /// Appends a message. `seq` is assigned inside the transaction, so the
    /// per-chat order is strictly increasing no matter how sends interleave.
    pub fn send_message(
        &self,
        requester: Uuid,
        chat_id: Uuid,
        content: &str,
    ) -> StoreResult<Message> {
        if content.trim().is_empty() {
            return Err(StoreError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        self.with_tx(|tx| {
            require_chat_for(tx, chat_id, requester)?;

            let id = Uuid::new_v4();
            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, seq, created_at)
                 SELECT ?1, ?2, ?3, ?4, COALESCE(MAX(seq), 0) + 1, ?5
                   FROM messages WHERE chat_id = ?2",
                params![
                    id.to_string(),
                    chat_id.to_string(),
                    requester.to_string(),
                    content,
                    created_at.to_rfc3339(),
                ],
            )?;

            let seq: i64 = tx.query_row(
                "SELECT seq FROM messages WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )?;

            Ok(Message {
                id,
                chat_id,
                sender_id: requester,
                content: content.to_string(),
                seq,
                created_at,
            })
        })
    }

    /// The full message sequence of a chat, ascending by creation order.
    pub fn get_messages(&self, requester: Uuid, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            require_chat_for(conn, chat_id, requester)?;

            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, content, seq, created_at
                   FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map([chat_id.to_string()], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Upserts the requester's read pointer for the chat. The pointer may
    /// reference a message sent by either participant: it means "read up to
    /// and including this", not "read the counterpart's messages".
    pub fn mark_read(
        &self,
        requester: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
    ) -> StoreResult<ReadReceipt> {
        self.with_tx(|tx| {
            require_chat_for(tx, chat_id, requester)?;

            let in_chat: Option<i64> = tx
                .query_row(
                    "SELECT seq FROM messages WHERE id = ?1 AND chat_id = ?2",
                    params![message_id.to_string(), chat_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if in_chat.is_none() {
                return Err(StoreError::NotFound("message"));
            }

            let last_read_at = Utc::now();
            tx.execute(
                "INSERT INTO read_receipts (chat_id, user_id, last_read_message_id, last_read_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (chat_id, user_id) DO UPDATE SET
                     last_read_message_id = excluded.last_read_message_id,
                     last_read_at = excluded.last_read_at",
                params![
                    chat_id.to_string(),
                    requester.to_string(),
                    message_id.to_string(),
                    last_read_at.to_rfc3339(),
                ],
            )?;

            Ok(ReadReceipt {
                chat_id,
                user_id: requester,
                last_read_message_id: message_id,
                last_read_at,
            })
        })
    }

    /// The counterpart's read receipt, which the requester needs to derive
    /// seen status for their own messages. Absent until the counterpart has
    /// marked anything read.
    pub fn get_read_receipt(
        &self,
        requester: Uuid,
        chat_id: Uuid,
    ) -> StoreResult<Option<ReadReceipt>> {
        self.with_conn(|conn| {
            let chat = require_chat_for(conn, chat_id, requester)?;
            let counterpart = chat
                .counterpart(requester)
                .ok_or(StoreError::Unauthorized)?;
            query_receipt(conn, chat_id, counterpart)
        })
    }

    /// Overwrites the requester's typing slot, preserving the other one.
    /// A missing chat is a silent no-op: typing is an advisory signal and
    /// availability wins over strictness here.
    pub fn set_typing(&self, requester: Uuid, chat_id: Uuid, is_typing: bool) -> StoreResult<()> {
        self.with_tx(|tx| {
            let Some(chat) = query_chat(tx, chat_id)? else {
                return Ok(());
            };
            if !chat.is_participant(requester) {
                return Err(StoreError::Unauthorized);
            }

            tx.execute(
                "UPDATE chats SET
                     user_typing = CASE WHEN user_id = ?1 THEN ?2 ELSE user_typing END,
                     other_typing = CASE WHEN other_user_id = ?1 THEN ?2 ELSE other_typing END
                 WHERE id = ?3",
                params![requester.to_string(), is_typing, chat_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn get_typing(&self, requester: Uuid, chat_id: Uuid) -> StoreResult<HashMap<Uuid, bool>> {
        self.with_conn(|conn| {
            let chat = require_chat_for(conn, chat_id, requester)?;
            Ok(chat.typing_map())
        })
    }

    /// Both participants of a chat as display projections, requester first.
    pub fn get_chat_participants(
        &self,
        requester: Uuid,
        chat_id: Uuid,
    ) -> StoreResult<(UserLite, UserLite)> {
        self.with_conn(|conn| {
            let chat = require_chat_for(conn, chat_id, requester)?;
            let counterpart = chat
                .counterpart(requester)
                .ok_or(StoreError::Unauthorized)?;

            let me = query_user_lite(conn, requester)?;
            let other = query_user_lite(conn, counterpart)?;
            Ok((me, other))
        })
    }

    /// The chat overview: every chat the requester participates in, with
    /// the counterpart, the latest message, the requester's unread count
    /// and the read-state of the latest message.
    pub fn get_user_chats(&self, requester: Uuid) -> StoreResult<Vec<ChatSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, other_user_id, user_typing, other_typing, created_at
                   FROM chats
                  WHERE user_id = ?1 OR other_user_id = ?1
                  ORDER BY created_at ASC",
            )?;
            let chats = stmt
                .query_map([requester.to_string()], chat_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut summaries = Vec::with_capacity(chats.len());
            for chat in chats {
                let counterpart = chat
                    .counterpart(requester)
                    .ok_or(StoreError::Unauthorized)?;
                let other_user = query_user_lite(conn, counterpart)?;

                let last_message = query_last_message(conn, chat.id)?;
                let my_receipt = query_receipt(conn, chat.id, requester)?;
                let their_receipt = query_receipt(conn, chat.id, counterpart)?;

                let unread_count = unread_count(
                    conn,
                    chat.id,
                    counterpart,
                    my_receipt.as_ref().map(|r| r.last_read_message_id),
                )?;

                let last_message_read = LastMessageRead {
                    is_read: match (&their_receipt, &last_message) {
                        (Some(receipt), Some(last)) => receipt.last_read_message_id == last.id,
                        _ => false,
                    },
                    read_at: their_receipt.map(|r| r.last_read_at),
                };

                summaries.push(ChatSummary {
                    chat: chat.to_chat(),
                    other_user,
                    last_message,
                    unread_count,
                    last_message_read,
                });
            }

            Ok(summaries)
        })
    }
}

/// Messages from the counterpart strictly after the viewer's read pointer.
/// Computed over `seq` positions, never timestamps, so clock skew between
/// writers cannot shift the count. A missing or dangling pointer resolves
/// to position 0: every counterpart message counts as unread.
fn unread_count(
    conn: &Connection,
    chat_id: Uuid,
    counterpart: Uuid,
    pointer: Option<Uuid>,
) -> StoreResult<u64> {
    let pointer = pointer.map(|p| p.to_string()).unwrap_or_default();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages
          WHERE chat_id = ?1 AND sender_id = ?2
            AND seq > COALESCE(
                (SELECT seq FROM messages WHERE id = ?3 AND chat_id = ?1), 0)",
        params![chat_id.to_string(), counterpart.to_string(), pointer],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub(crate) fn query_chat(conn: &Connection, chat_id: Uuid) -> StoreResult<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, other_user_id, user_typing, other_typing, created_at
               FROM chats WHERE id = ?1",
            [chat_id.to_string()],
            chat_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_chat_by_pair(conn: &Connection, pair: &ChatPair) -> StoreResult<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, other_user_id, user_typing, other_typing, created_at
               FROM chats
              WHERE MIN(user_id, other_user_id) = ?1
                AND MAX(user_id, other_user_id) = ?2",
            params![pair.lo().to_string(), pair.hi().to_string()],
            chat_from_row,
        )
        .optional()?;
    Ok(row)
}

/// The common precondition of every chat-scoped operation: the chat exists
/// and the requester is one of its two participants.
pub(crate) fn require_chat_for(
    conn: &Connection,
    chat_id: Uuid,
    requester: Uuid,
) -> StoreResult<ChatRow> {
    let chat = query_chat(conn, chat_id)?.ok_or(StoreError::NotFound("chat"))?;
    if !chat.is_participant(requester) {
        return Err(StoreError::Unauthorized);
    }
    Ok(chat)
}

fn query_last_message(conn: &Connection, chat_id: Uuid) -> StoreResult<Option<Message>> {
    let row = conn
        .query_row(
            "SELECT id, chat_id, sender_id, content, seq, created_at
               FROM messages WHERE chat_id = ?1
              ORDER BY seq DESC LIMIT 1",
            [chat_id.to_string()],
            message_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_receipt(
    conn: &Connection,
    chat_id: Uuid,
    user_id: Uuid,
) -> StoreResult<Option<ReadReceipt>> {
    let row = conn
        .query_row(
            "SELECT chat_id, user_id, last_read_message_id, last_read_at
               FROM read_receipts WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
            receipt_from_row,
        )
        .optional()?;
    Ok(row)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        other_user_id: uuid_col(row, 2)?,
        user_typing: row.get(3)?,
        other_typing: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        chat_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        content: row.get(3)?,
        seq: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

fn receipt_from_row(row: &Row<'_>) -> rusqlite::Result<ReadReceipt> {
    Ok(ReadReceipt {
        chat_id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        last_read_message_id: uuid_col(row, 2)?,
        last_read_at: ts_col(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::super::testutil::{db, seed_user};
    use crate::StoreError;

    #[test]
    fn chat_lookup_is_symmetric_and_idempotent() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        let first = db.get_or_create_chat(a.id, b.id).unwrap();
        let second = db.get_or_create_chat(b.id, a.id).unwrap();
        let third = db.get_or_create_chat(a.id, b.id).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);

        // exactly one chat exists from either side's view
        assert_eq!(db.get_user_chats(a.id).unwrap().len(), 1);
        assert_eq!(db.get_user_chats(b.id).unwrap().len(), 1);
    }

    #[test]
    fn racing_creations_agree_on_one_chat() {
        use std::sync::Arc;

        let db = Arc::new(crate::Database::open_in_memory().unwrap());
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                // alternate which side initiates
                let (x, y) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
                std::thread::spawn(move || db.get_or_create_chat(x, y).unwrap())
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn chat_with_self_or_unknown_user_fails() {
        let db = db();
        let a = seed_user(&db, "alice");

        let err = db.get_or_create_chat(a.id, a.id).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = db.get_or_create_chat(a.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("user")));
    }

    #[test]
    fn messages_come_back_in_send_order() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let m1 = db.send_message(a.id, chat, "one").unwrap();
        let m2 = db.send_message(b.id, chat, "two").unwrap();
        let m3 = db.send_message(a.id, chat, "three").unwrap();

        let messages = db.get_messages(a.id, chat).unwrap();
        assert_eq!(
            messages.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id, m3.id]
        );
        assert_eq!(
            messages.iter().map(|m| m.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn outsiders_cannot_send_or_read() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let eve = seed_user(&db, "eve");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let err = db.send_message(eve.id, chat, "hi").unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));

        let err = db.get_messages(eve.id, chat).unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));

        let err = db.send_message(a.id, Uuid::new_v4(), "hi").unwrap_err();
        assert!(matches!(err, StoreError::NotFound("chat")));
    }

    #[test]
    fn empty_message_rejected_before_write() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let err = db.send_message(a.id, chat, "   ").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(db.get_messages(a.id, chat).unwrap().is_empty());
    }

    #[test]
    fn unread_counts_follow_position_not_author_of_pointer() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        // [m1 from A, m2 from B, m3 from A]; B has read up to m1
        let m1 = db.send_message(a.id, chat, "m1").unwrap();
        let _m2 = db.send_message(b.id, chat, "m2").unwrap();
        let m3 = db.send_message(a.id, chat, "m3").unwrap();

        db.mark_read(b.id, chat, m1.id).unwrap();

        // for B: A's messages strictly after m1 = {m3}
        let b_view = &db.get_user_chats(b.id).unwrap()[0];
        assert_eq!(b_view.unread_count, 1);

        // for A, no receipt yet: every message from B counts
        let a_view = &db.get_user_chats(a.id).unwrap()[0];
        assert_eq!(a_view.unread_count, 1);

        // pointers may reference either side's message
        db.mark_read(b.id, chat, m3.id).unwrap();
        let b_view = &db.get_user_chats(b.id).unwrap()[0];
        assert_eq!(b_view.unread_count, 0);
    }

    #[test]
    fn seen_status_requires_pointer_at_latest_message() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let m1 = db.send_message(a.id, chat, "m1").unwrap();
        let m2 = db.send_message(a.id, chat, "m2").unwrap();

        // B read only m1: A's latest message is not yet seen
        db.mark_read(b.id, chat, m1.id).unwrap();
        let a_view = &db.get_user_chats(a.id).unwrap()[0];
        assert!(!a_view.last_message_read.is_read);
        assert!(a_view.last_message_read.read_at.is_some());

        db.mark_read(b.id, chat, m2.id).unwrap();
        let a_view = &db.get_user_chats(a.id).unwrap()[0];
        assert!(a_view.last_message_read.is_read);

        let receipt = db.get_read_receipt(a.id, chat).unwrap().unwrap();
        assert_eq!(receipt.user_id, b.id);
        assert_eq!(receipt.last_read_message_id, m2.id);
    }

    #[test]
    fn mark_read_rejects_foreign_messages() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let c = seed_user(&db, "carol");
        let chat_ab = db.get_or_create_chat(a.id, b.id).unwrap();
        let chat_ac = db.get_or_create_chat(a.id, c.id).unwrap();

        let other_chat_msg = db.send_message(a.id, chat_ac, "elsewhere").unwrap();

        let err = db.mark_read(b.id, chat_ab, other_chat_msg.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("message")));
    }

    #[test]
    fn typing_writes_one_slot_and_preserves_the_other() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        db.set_typing(a.id, chat, true).unwrap();
        db.set_typing(b.id, chat, true).unwrap();
        db.set_typing(a.id, chat, false).unwrap();

        let typing = db.get_typing(b.id, chat).unwrap();
        assert_eq!(typing[&a.id], false);
        assert_eq!(typing[&b.id], true);
    }

    #[test]
    fn typing_on_missing_chat_is_a_silent_noop() {
        let db = db();
        let a = seed_user(&db, "alice");

        db.set_typing(a.id, Uuid::new_v4(), true).unwrap();
    }

    #[test]
    fn typing_still_requires_participancy() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let eve = seed_user(&db, "eve");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let err = db.set_typing(eve.id, chat, true).unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));

        let err = db.get_typing(eve.id, chat).unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));
    }

    #[test]
    fn chat_summaries_carry_counterpart_and_last_message() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();
        let last = db.send_message(b.id, chat, "newest").unwrap();

        let summaries = db.get_user_chats(a.id).unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];

        assert_eq!(summary.chat.id, chat);
        assert_eq!(summary.other_user.id, b.id);
        assert_eq!(summary.last_message.as_ref().map(|m| m.id), Some(last.id));
        assert_eq!(summary.unread_count, 1);
        assert!(!summary.last_message_read.is_read);
    }

    #[test]
    fn participants_resolve_requester_first() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let chat = db.get_or_create_chat(a.id, b.id).unwrap();

        let (me, other) = db.get_chat_participants(b.id, chat).unwrap();
        assert_eq!(me.id, b.id);
        assert_eq!(other.id, a.id);
    }
}
