use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use ripple_types::models::{User, UserLite};

use super::{ts_col, uuid_col};
use crate::{Database, StoreError, StoreResult};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;

const USER_COLS: &str =
    "id, username, fullname, bio, image, follower_count, following_count, post_count, created_at";

impl Database {
    /// Idempotent provisioning keyed on the identity provider's subject.
    /// Called by the identity webhook for both `user.created` and
    /// `user.updated` events; profile fields owned by the provider
    /// (fullname, image) are refreshed on repeat calls.
    pub fn upsert_user_from_identity(
        &self,
        identity_ref: &str,
        username: &str,
        fullname: Option<&str>,
        image: &str,
        bio: Option<&str>,
    ) -> StoreResult<User> {
        let username = validate_username(username)?;

        self.with_tx(|tx| {
            if let Some(existing) = query_user_by_identity_ref(tx, identity_ref)? {
                tx.execute(
                    "UPDATE users SET fullname = COALESCE(?1, fullname), image = ?2 WHERE id = ?3",
                    params![fullname, image, existing.id.to_string()],
                )?;
                return require_user(tx, existing.id);
            }

            if username_taken(tx, &username, None)? {
                return Err(StoreError::Conflict(format!(
                    "username '{username}' is already taken"
                )));
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO users (id, username, fullname, bio, image, identity_ref, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    username,
                    fullname,
                    bio,
                    image,
                    identity_ref,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            require_user(tx, id)
        })
    }

    pub fn get_user(&self, id: Uuid) -> StoreResult<User> {
        self.with_conn(|conn| require_user(conn, id))
    }

    pub fn get_user_by_identity_ref(&self, identity_ref: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user_by_identity_ref(conn, identity_ref))
    }

    pub fn update_profile(
        &self,
        requester: Uuid,
        username: &str,
        fullname: Option<&str>,
        bio: Option<&str>,
    ) -> StoreResult<User> {
        let username = validate_username(username)?;

        self.with_tx(|tx| {
            if username_taken(tx, &username, Some(requester))? {
                return Err(StoreError::Conflict(format!(
                    "username '{username}' is already taken"
                )));
            }

            let changed = tx.execute(
                "UPDATE users SET username = ?1, fullname = ?2, bio = ?3 WHERE id = ?4",
                params![username, fullname, bio, requester.to_string()],
            )?;
            if changed != 1 {
                return Err(StoreError::NotFound("user"));
            }
            require_user(tx, requester)
        })
    }

    /// Substring match on username, excluding the requester.
    pub fn search_users(&self, requester: Uuid, query: &str) -> StoreResult<Vec<UserLite>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, image FROM users
                 WHERE id <> ?1 AND instr(username, ?2) > 0
                 ORDER BY username",
            )?;

            let rows = stmt
                .query_map(params![requester.to_string(), query], user_lite_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// A user's current name always counts as available to themselves.
    pub fn is_username_available(&self, requester: Uuid, username: &str) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(!username_taken(conn, username.trim(), Some(requester))?))
    }
}

fn validate_username(username: &str) -> StoreResult<String> {
    let username = username.trim();
    if username.len() < MIN_USERNAME_LEN {
        return Err(StoreError::Validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(StoreError::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(username.to_string())
}

fn username_taken(conn: &Connection, username: &str, allow: Option<Uuid>) -> StoreResult<bool> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match holder {
        Some(id) => allow.map(|u| u.to_string()) != Some(id),
        None => false,
    })
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn query_user(conn: &Connection, id: Uuid) -> StoreResult<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            [id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn require_user(conn: &Connection, id: Uuid) -> StoreResult<User> {
    query_user(conn, id)?.ok_or(StoreError::NotFound("user"))
}

pub(crate) fn query_user_by_identity_ref(
    conn: &Connection,
    identity_ref: &str,
) -> StoreResult<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE identity_ref = ?1"),
            [identity_ref],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn query_user_lite(conn: &Connection, id: Uuid) -> StoreResult<UserLite> {
    conn.query_row(
        "SELECT id, username, image FROM users WHERE id = ?1",
        [id.to_string()],
        user_lite_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound("user"))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        fullname: row.get(2)?,
        bio: row.get(3)?,
        image: row.get(4)?,
        follower_count: row.get::<_, i64>(5)?.max(0) as u64,
        following_count: row.get::<_, i64>(6)?.max(0) as u64,
        post_count: row.get::<_, i64>(7)?.max(0) as u64,
        created_at: ts_col(row, 8)?,
    })
}

fn user_lite_from_row(row: &Row<'_>) -> rusqlite::Result<UserLite> {
    Ok(UserLite {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        image: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{db, seed_user};
    use crate::StoreError;

    #[test]
    fn identity_upsert_is_idempotent() {
        let db = db();

        let first = db
            .upsert_user_from_identity("idp|alice", "alice", Some("Alice"), "img-a", None)
            .unwrap();
        let second = db
            .upsert_user_from_identity("idp|alice", "alice", Some("Alice A."), "img-b", None)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.fullname.as_deref(), Some("Alice A."));
        assert_eq!(second.image, "img-b");
        assert_eq!(second.follower_count, 0);
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let db = db();
        seed_user(&db, "alice");

        let err = db
            .upsert_user_from_identity("idp|other", "alice", None, "img", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn short_username_rejected_before_write() {
        let db = db();
        let alice = seed_user(&db, "alice");

        let err = db.update_profile(alice.id, "ab", None, None).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // nothing was written
        assert_eq!(db.get_user(alice.id).unwrap().username, "alice");
    }

    #[test]
    fn profile_update_conflicts_on_taken_username() {
        let db = db();
        let alice = seed_user(&db, "alice");
        seed_user(&db, "bob");

        let err = db.update_profile(alice.id, "bob", None, None).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let updated = db
            .update_profile(alice.id, "alice2", Some("Alice"), Some("hi"))
            .unwrap();
        assert_eq!(updated.username, "alice2");
        assert_eq!(updated.bio.as_deref(), Some("hi"));
    }

    #[test]
    fn search_excludes_requester() {
        let db = db();
        let alice = seed_user(&db, "alice");
        seed_user(&db, "alicia");
        seed_user(&db, "bob");

        let hits = db.search_users(alice.id, "ali").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alicia");
    }

    #[test]
    fn own_username_counts_as_available() {
        let db = db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        assert!(db.is_username_available(alice.id, "alice").unwrap());
        assert!(!db.is_username_available(bob.id, "alice").unwrap());
        assert!(db.is_username_available(bob.id, "brand-new").unwrap());
    }
}
