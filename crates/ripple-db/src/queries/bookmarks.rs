use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use ripple_types::models::Post;

use super::posts::{POST_COLS, post_from_row, query_post};
use crate::{Database, StoreError, StoreResult};

impl Database {
    /// Saves or unsaves a post. Returns the new membership state: `true`
    /// means the bookmark now exists.
    pub fn toggle_bookmark(&self, requester: Uuid, post_id: Uuid) -> StoreResult<bool> {
        self.with_tx(|tx| {
            if query_post(tx, post_id)?.is_none() {
                return Err(StoreError::NotFound("post"));
            }

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
                    params![requester.to_string(), post_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                tx.execute(
                    "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
                    params![requester.to_string(), post_id.to_string()],
                )?;
                Ok(false)
            } else {
                tx.execute(
                    "INSERT INTO bookmarks (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
                    params![
                        requester.to_string(),
                        post_id.to_string(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(true)
            }
        })
    }

    /// Bookmarked posts, most recently bookmarked first. A post deleted by
    /// its own subsystem simply drops out of the join: dangling bookmarks
    /// are tolerated by omission, not surfaced as errors.
    pub fn list_bookmarks(&self, requester: Uuid) -> StoreResult<Vec<Post>> {
        self.with_conn(|conn| {
            let post_cols = POST_COLS
                .split(", ")
                .map(|c| format!("p.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {post_cols} FROM posts p
                   JOIN bookmarks b ON b.post_id = p.id
                  WHERE b.user_id = ?1
                  ORDER BY b.created_at DESC, b.rowid DESC"
            ))?;

            let rows = stmt
                .query_map([requester.to_string()], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::super::testutil::{db, seed_user};
    use crate::StoreError;

    #[test]
    fn toggle_reports_new_membership_and_double_toggle_restores() {
        let db = db();
        let a = seed_user(&db, "alice");
        let post = db.create_post(a.id, "https://img.example/p.png", None).unwrap();

        assert!(db.toggle_bookmark(a.id, post.id).unwrap());
        assert_eq!(db.list_bookmarks(a.id).unwrap().len(), 1);

        assert!(!db.toggle_bookmark(a.id, post.id).unwrap());
        assert!(db.list_bookmarks(a.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_post_is_not_found() {
        let db = db();
        let a = seed_user(&db, "alice");

        let err = db.toggle_bookmark(a.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("post")));
    }

    #[test]
    fn listing_orders_by_most_recent_bookmark() {
        let db = db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let p1 = db.create_post(b.id, "https://img.example/1.png", None).unwrap();
        let p2 = db.create_post(b.id, "https://img.example/2.png", None).unwrap();

        db.toggle_bookmark(a.id, p1.id).unwrap();
        db.toggle_bookmark(a.id, p2.id).unwrap();

        let saved = db.list_bookmarks(a.id).unwrap();
        assert_eq!(
            saved.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![p2.id, p1.id]
        );
    }

    #[test]
    fn dangling_bookmarks_are_omitted() {
        let db = db();
        let a = seed_user(&db, "alice");
        let post = db.create_post(a.id, "https://img.example/p.png", None).unwrap();
        db.toggle_bookmark(a.id, post.id).unwrap();

        // the post subsystem deletes the post out from under the bookmark
        db.with_conn(|conn| {
            conn.execute("DELETE FROM posts WHERE id = ?1", [post.id.to_string()])?;
            Ok(())
        })
        .unwrap();

        assert!(db.list_bookmarks(a.id).unwrap().is_empty());
    }
}
