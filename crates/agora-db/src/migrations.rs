use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id     TEXT NOT NULL UNIQUE,
                display_name    TEXT,
                handle          TEXT UNIQUE,
                avatar_url      TEXT,
                bio             TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE categories (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                slug            TEXT NOT NULL UNIQUE,
                name            TEXT NOT NULL,
                description     TEXT
            );

            CREATE TABLE threads (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id     INTEGER NOT NULL REFERENCES categories(id),
                author_user_id  INTEGER NOT NULL REFERENCES users(id),
                title           TEXT NOT NULL,
                body            TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_threads_created ON threads(created_at);

            CREATE TABLE replies (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id       INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                author_user_id  INTEGER NOT NULL REFERENCES users(id),
                body            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_replies_thread ON replies(thread_id, created_at);

            CREATE TABLE thread_reactions (
                thread_id       INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                user_id         INTEGER NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                CONSTRAINT uniq_thread_reaction UNIQUE (thread_id, user_id)
            );

            CREATE TABLE notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id),
                actor_user_id   INTEGER NOT NULL REFERENCES users(id),
                thread_id       INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                type            TEXT NOT NULL CHECK (type IN ('REPLY_ON_THREAD', 'LIKE_ON_THREAD')),
                created_at      TEXT NOT NULL,
                read_at         TEXT,
                CHECK (user_id <> actor_user_id)
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            CREATE TABLE direct_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                recipient_id    INTEGER NOT NULL REFERENCES users(id),
                body            TEXT,
                image_url       TEXT,
                created_at      TEXT NOT NULL,
                CHECK (body IS NOT NULL OR image_url IS NOT NULL),
                CHECK (sender_id <> recipient_id)
            );

            CREATE INDEX idx_direct_messages_pair
                ON direct_messages(sender_id, recipient_id, created_at);

            INSERT INTO categories (slug, name, description) VALUES
                ('general', 'General', 'Anything that does not fit elsewhere'),
                ('help', 'Help', 'Questions and answers'),
                ('showcase', 'Showcase', 'Show what you built');

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let categories: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(categories, 3);
    }
}
