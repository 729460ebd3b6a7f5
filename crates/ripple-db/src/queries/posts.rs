use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use ripple_types::models::Post;

use super::{ts_col, uuid_col};
use crate::{Database, StoreError, StoreResult};

pub(crate) const POST_COLS: &str =
    "id, author_id, image_url, caption, like_count, comment_count, created_at";

impl Database {
    /// Inserts a post and bumps the author's stored post count in the same
    /// transaction, keeping the counter equal to the relation's cardinality.
    pub fn create_post(
        &self,
        author: Uuid,
        image_url: &str,
        caption: Option<&str>,
    ) -> StoreResult<Post> {
        if image_url.trim().is_empty() {
            return Err(StoreError::Validation(
                "post image url must not be empty".to_string(),
            ));
        }

        self.with_tx(|tx| {
            let id = Uuid::new_v4();
            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO posts (id, author_id, image_url, caption, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    author.to_string(),
                    image_url,
                    caption,
                    created_at.to_rfc3339(),
                ],
            )?;
            tx.execute(
                "UPDATE users SET post_count = post_count + 1 WHERE id = ?1",
                [author.to_string()],
            )?;

            Ok(Post {
                id,
                author_id: author,
                image_url: image_url.to_string(),
                caption: caption.map(str::to_string),
                like_count: 0,
                comment_count: 0,
                created_at,
            })
        })
    }

    pub fn get_post(&self, id: Uuid) -> StoreResult<Post> {
        self.with_conn(|conn| {
            query_post(conn, id)?.ok_or(StoreError::NotFound("post"))
        })
    }
}

pub(crate) fn query_post(conn: &Connection, id: Uuid) -> StoreResult<Option<Post>> {
    let row = conn
        .query_row(
            &format!("SELECT {POST_COLS} FROM posts WHERE id = ?1"),
            [id.to_string()],
            post_from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: uuid_col(row, 0)?,
        author_id: uuid_col(row, 1)?,
        image_url: row.get(2)?,
        caption: row.get(3)?,
        like_count: row.get::<_, i64>(4)?.max(0) as u64,
        comment_count: row.get::<_, i64>(5)?.max(0) as u64,
        created_at: ts_col(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{db, seed_user};
    use crate::StoreError;
    use uuid::Uuid;

    #[test]
    fn creating_a_post_bumps_the_author_counter() {
        let db = db();
        let a = seed_user(&db, "alice");

        let post = db.create_post(a.id, "https://img.example/1.png", Some("first")).unwrap();
        db.create_post(a.id, "https://img.example/2.png", None).unwrap();

        assert_eq!(db.get_user(a.id).unwrap().post_count, 2);
        assert_eq!(db.get_post(post.id).unwrap().caption.as_deref(), Some("first"));
    }

    #[test]
    fn missing_post_is_not_found() {
        let db = db();
        seed_user(&db, "alice");

        let err = db.get_post(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("post")));
    }
}
