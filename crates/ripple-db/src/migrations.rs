use rusqlite::Connection;
use tracing::info;

use crate::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            fullname        TEXT,
            bio             TEXT,
            image           TEXT NOT NULL,
            follower_count  INTEGER NOT NULL DEFAULT 0,
            following_count INTEGER NOT NULL DEFAULT 0,
            post_count      INTEGER NOT NULL DEFAULT 0,
            identity_ref    TEXT NOT NULL UNIQUE,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chats (
            id             TEXT PRIMARY KEY,
            user_id        TEXT NOT NULL REFERENCES users(id),
            other_user_id  TEXT NOT NULL REFERENCES users(id),
            user_typing    INTEGER NOT NULL DEFAULT 0,
            other_typing   INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL,
            CHECK (user_id <> other_user_id)
        );

        -- One chat per unordered pair, regardless of which side created it.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_pair
            ON chats (MIN(user_id, other_user_id), MAX(user_id, other_user_id));

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE (chat_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, seq);

        CREATE TABLE IF NOT EXISTS read_receipts (
            chat_id               TEXT NOT NULL REFERENCES chats(id),
            user_id               TEXT NOT NULL REFERENCES users(id),
            last_read_message_id  TEXT NOT NULL,
            last_read_at          TEXT NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS follows (
            follower_id   TEXT NOT NULL REFERENCES users(id),
            following_id  TEXT NOT NULL REFERENCES users(id),
            created_at    TEXT NOT NULL,
            PRIMARY KEY (follower_id, following_id),
            CHECK (follower_id <> following_id)
        );

        CREATE INDEX IF NOT EXISTS idx_follows_following
            ON follows(following_id);

        CREATE TABLE IF NOT EXISTS posts (
            id             TEXT PRIMARY KEY,
            author_id      TEXT NOT NULL REFERENCES users(id),
            image_url      TEXT NOT NULL,
            caption        TEXT,
            like_count     INTEGER NOT NULL DEFAULT 0,
            comment_count  INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_author
            ON posts(author_id);

        -- post_id deliberately has no FK: posts are deleted by a subsystem
        -- outside this store, and a dangling notification or bookmark is
        -- tolerated by omission at read time.
        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            receiver_id  TEXT NOT NULL REFERENCES users(id),
            sender_id    TEXT NOT NULL REFERENCES users(id),
            kind         TEXT NOT NULL CHECK (kind IN ('follow', 'like', 'comment')),
            post_id      TEXT,
            comment_id   TEXT,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_receiver
            ON notifications(receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS bookmarks (
            user_id     TEXT NOT NULL REFERENCES users(id),
            post_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, post_id)
        );

        CREATE INDEX IF NOT EXISTS idx_bookmarks_user
            ON bookmarks(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
