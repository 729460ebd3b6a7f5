use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use ripple_types::models::{Notification, NotificationKind, UserLite};

use super::users::{query_user_lite, user_exists};
use super::{ts_col, uuid_col};
use crate::{Database, StoreError, StoreResult};

impl Database {
    /// Follows or unfollows in one transaction: the edge write and both
    /// counter updates commit together or not at all. A notification is
    /// created only when the edge is created; the return value carries it
    /// for fan-out, `None` means an unfollow happened.
    pub fn toggle_follow(
        &self,
        requester: Uuid,
        target: Uuid,
    ) -> StoreResult<Option<Notification>> {
        if requester == target {
            return Err(StoreError::Validation(
                "cannot follow yourself".to_string(),
            ));
        }

        self.with_tx(|tx| {
            if !user_exists(tx, target)? {
                return Err(StoreError::NotFound("user"));
            }

            if edge_exists(tx, requester, target)? {
                tx.execute(
                    "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    params![requester.to_string(), target.to_string()],
                )?;
                decrement_counter(tx, target, "follower_count")?;
                decrement_counter(tx, requester, "following_count")?;
                Ok(None)
            } else {
                tx.execute(
                    "INSERT INTO follows (follower_id, following_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![
                        requester.to_string(),
                        target.to_string(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                tx.execute(
                    "UPDATE users SET follower_count = follower_count + 1 WHERE id = ?1",
                    [target.to_string()],
                )?;
                tx.execute(
                    "UPDATE users SET following_count = following_count + 1 WHERE id = ?1",
                    [requester.to_string()],
                )?;

                let sender = query_user_lite(tx, requester)?;
                let notification =
                    insert_notification(tx, target, sender, NotificationKind::Follow, None, None)?;
                Ok(Some(notification))
            }
        })
    }

    pub fn is_following(&self, requester: Uuid, target: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| edge_exists(conn, requester, target))
    }

    /// Receiver-scoped notifications, newest first, with the sender joined
    /// in for display.
    pub fn list_notifications(&self, receiver: Uuid) -> StoreResult<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.receiver_id, n.kind, n.post_id, n.comment_id, n.created_at,
                        u.id, u.username, u.image
                   FROM notifications n
                   JOIN users u ON u.id = n.sender_id
                  WHERE n.receiver_id = ?1
                  ORDER BY n.created_at DESC, n.rowid DESC",
            )?;

            let rows = stmt
                .query_map([receiver.to_string()], notification_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn edge_exists(conn: &Connection, follower: Uuid, following: Uuid) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower.to_string(), following.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Guarded decrement. The toggle invariant makes underflow unreachable; if
/// the guard ever fails the stored counter disagrees with the edge relation
/// and the transaction must not commit.
fn decrement_counter(conn: &Connection, user: Uuid, column: &str) -> StoreResult<()> {
    let changed = conn.execute(
        &format!("UPDATE users SET {column} = {column} - 1 WHERE id = ?1 AND {column} > 0"),
        [user.to_string()],
    )?;
    if changed != 1 {
        return Err(StoreError::CounterCorruption(format!(
            "{column} underflow for user {user}"
        )));
    }
    Ok(())
}

pub(crate) fn insert_notification(
    conn: &Connection,
    receiver: Uuid,
    sender: UserLite,
    kind: NotificationKind,
    post_id: Option<Uuid>,
    comment_id: Option<Uuid>,
) -> StoreResult<Notification> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO notifications (id, receiver_id, sender_id, kind, post_id, comment_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            receiver.to_string(),
            sender.id.to_string(),
            kind_to_str(kind),
            post_id.map(|p| p.to_string()),
            comment_id.map(|c| c.to_string()),
            created_at.to_rfc3339(),
        ],
    )?;

    Ok(Notification {
        id,
        receiver_id: receiver,
        sender,
        kind,
        post_id,
        comment_id,
        created_at,
    })
}

fn kind_to_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Follow => "follow",
        NotificationKind::Like => "like",
        NotificationKind::Comment => "comment",
    }
}

fn kind_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NotificationKind> {
    let s: String = row.get(idx)?;
    match s.as_str() {
        "follow" => Ok(NotificationKind::Follow),
        "like" => Ok(NotificationKind::Like),
        "comment" => Ok(NotificationKind::Comment),
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "kind".to_string(),
            rusqlite::types::Type::Text,
        )),
    }
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid_col(row, 0)?,
        receiver_id: uuid_col(row, 1)?,
        kind: kind_col(row, 2)?,
        post_id: opt_uuid_col(row, 3)?,
        comment_id: opt_uuid_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        sender: UserLite {
            id: uuid_col(row, 6)?,
            username: row.get(7)?,
            image: row.get(8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::super::testutil::{db, seed_user};
    use crate::StoreError;
    use ripple_types::models::NotificationKind;

    #[test]
    fn first_follow_updates_both_counters_and_notifies() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        let notification = db.toggle_follow(a.id, b.id).unwrap();

        let notification = notification.expect("edge creation carries a notification");
        assert_eq!(notification.receiver_id, b.id);
        assert_eq!(notification.sender.id, a.id);
        assert_eq!(notification.kind, NotificationKind::Follow);

        assert_eq!(db.get_user(a.id).unwrap().following_count, 1);
        assert_eq!(db.get_user(b.id).unwrap().follower_count, 1);
        assert!(db.is_following(a.id, b.id).unwrap());
        assert!(!db.is_following(b.id, a.id).unwrap());

        // exactly one notification for B
        assert_eq!(db.list_notifications(b.id).unwrap().len(), 1);
    }

    #[test]
    fn toggle_is_its_own_inverse() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        db.toggle_follow(a.id, b.id).unwrap();
        let second = db.toggle_follow(a.id, b.id).unwrap();

        assert!(second.is_none(), "unfollow never notifies");
        assert!(!db.is_following(a.id, b.id).unwrap());
        assert_eq!(db.get_user(a.id).unwrap().following_count, 0);
        assert_eq!(db.get_user(b.id).unwrap().follower_count, 0);

        // the original notification remains; removal creates no new one
        assert_eq!(db.list_notifications(b.id).unwrap().len(), 1);
    }

    #[test]
    fn counters_match_edge_cardinality_across_sequences() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let c = seed_user(&db, "carol");

        db.toggle_follow(a.id, b.id).unwrap();
        db.toggle_follow(a.id, c.id).unwrap();
        db.toggle_follow(b.id, c.id).unwrap();
        db.toggle_follow(a.id, b.id).unwrap(); // unfollow
        db.toggle_follow(a.id, b.id).unwrap(); // refollow

        assert_eq!(db.get_user(a.id).unwrap().following_count, 2);
        assert_eq!(db.get_user(b.id).unwrap().following_count, 1);
        assert_eq!(db.get_user(b.id).unwrap().follower_count, 1);
        assert_eq!(db.get_user(c.id).unwrap().follower_count, 2);
    }

    #[test]
    fn self_follow_and_unknown_target_fail() {
        let db = db();
        let a = seed_user(&db, "alice");

        let err = db.toggle_follow(a.id, a.id).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = db.toggle_follow(a.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("user")));
    }

    #[test]
    fn concurrent_toggles_keep_counters_consistent() {
        use std::sync::Arc;

        let db = Arc::new(crate::Database::open_in_memory().unwrap());
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        // an even number of toggles from racing threads must restore the
        // initial state exactly
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let (follower, target) = (a.id, b.id);
                std::thread::spawn(move || {
                    db.toggle_follow(follower, target).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!db.is_following(a.id, b.id).unwrap());
        assert_eq!(db.get_user(a.id).unwrap().following_count, 0);
        assert_eq!(db.get_user(b.id).unwrap().follower_count, 0);
    }

    #[test]
    fn notifications_are_receiver_scoped_newest_first() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let c = seed_user(&db, "carol");

        db.toggle_follow(a.id, c.id).unwrap();
        db.toggle_follow(b.id, c.id).unwrap();

        let for_c = db.list_notifications(c.id).unwrap();
        assert_eq!(for_c.len(), 2);
        assert_eq!(for_c[0].sender.id, b.id);
        assert_eq!(for_c[1].sender.id, a.id);

        assert!(db.list_notifications(a.id).unwrap().is_empty());
    }
}
