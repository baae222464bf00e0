use agora_types::api::{ExternalIdentity, UpdateProfileRequest};
use agora_types::models::{Category, CategoryRef, ChatUser, Reply, ThreadSummary};
use agora_types::{AgoraError, UserId};
use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::models::{
    REPLY_SELECT, THREAD_SELECT, ThreadFilter, ThreadRow, USER_COLUMNS, UserRow, reply_from_row,
};
use crate::{Database, OptionalExt, is_foreign_key_violation, is_unique_violation};

const EXCERPT_CHARS: usize = 200;

impl Database {
    // -- Users --

    /// Create the user on first sight of an external identity, otherwise refresh
    /// display name and avatar. A missing attribute never erases a stored one.
    pub fn upsert_user_from_identity(&self, identity: &ExternalIdentity) -> Result<UserRow> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let sql = format!(
                "INSERT INTO users (external_id, display_name, avatar_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(external_id) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, users.display_name),
                     avatar_url = COALESCE(excluded.avatar_url, users.avatar_url),
                     updated_at = excluded.updated_at
                 RETURNING {}",
                USER_COLUMNS
            );
            let row = conn.query_row(
                &sql,
                params![identity.external_id, identity.display_name, identity.avatar_url, now],
                UserRow::from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                UserRow::from_row,
            )
            .optional()
        })
    }

    /// Apply the fields that are present. A taken handle is a conflict.
    pub fn update_user_profile(&self, id: UserId, update: &UpdateProfileRequest) -> Result<UserRow> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE users SET
                     display_name = COALESCE(?2, display_name),
                     handle = COALESCE(?3, handle),
                     bio = COALESCE(?4, bio),
                     avatar_url = COALESCE(?5, avatar_url),
                     updated_at = ?6
                 WHERE id = ?1
                 RETURNING {}",
                USER_COLUMNS
            );
            let result = conn.query_row(
                &sql,
                params![id, update.display_name, update.handle, update.bio, update.avatar_url, now],
                UserRow::from_row,
            );
            match result {
                Ok(row) => Ok(row),
                Err(e) if is_unique_violation(&e) => {
                    Err(AgoraError::Conflict("handle is already taken".into()).into())
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(AgoraError::not_found("user").into()),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Everyone except `exclude`, for the chat sidebar.
    pub fn list_chat_users(&self, exclude: UserId) -> Result<Vec<ChatUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, handle, avatar_url FROM users
                 WHERE id <> ?1
                 ORDER BY display_name ASC, handle ASC",
            )?;
            let rows = stmt
                .query_map([exclude], |row| {
                    Ok(ChatUser {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        handle: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Categories --

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, slug, name, description FROM categories ORDER BY name ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_category_id_by_slug(&self, slug: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM categories WHERE slug = ?1", [slug], |row| row.get(0))
                .optional()
        })
    }

    // -- Threads --

    pub fn create_thread(
        &self,
        category_id: i64,
        author_user_id: UserId,
        title: &str,
        body: &str,
    ) -> Result<i64> {
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO threads (category_id, author_user_id, title, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![category_id, author_user_id, title, body, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_thread(&self, id: i64) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE t.id = ?1", THREAD_SELECT),
                [id],
                ThreadRow::from_row,
            )
            .optional()
        })
    }

    pub fn get_thread_author(&self, id: i64) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT author_user_id FROM threads WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn list_threads(&self, filter: &ThreadFilter) -> Result<Vec<ThreadSummary>> {
        let order = if filter.newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            "{} WHERE (?1 IS NULL OR c.slug = ?1)
               AND (?2 IS NULL OR t.title LIKE ?2 ESCAPE '\\' OR t.body LIKE ?2 ESCAPE '\\')
             ORDER BY t.created_at {order}, t.id {order}
             LIMIT ?3 OFFSET ?4",
            THREAD_SELECT
        );
        let pattern = filter.search.as_deref().map(like_pattern);
        let limit = i64::from(filter.page_size);
        let offset = i64::from(filter.page.saturating_sub(1)) * limit;

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![filter.category_slug, pattern, limit, offset],
                    ThreadRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .map(|row| ThreadSummary {
                    id: row.id,
                    title: row.title,
                    excerpt: row.body.chars().take(EXCERPT_CHARS).collect(),
                    created_at: row.created_at,
                    category: CategoryRef {
                        slug: row.category_slug,
                        name: row.category_name,
                    },
                    author: row.author,
                })
                .collect())
        })
    }

    // -- Replies --

    /// Insert a reply and return it hydrated with the author's display attributes.
    pub fn create_reply(&self, thread_id: i64, author_user_id: UserId, body: &str) -> Result<Reply> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO replies (thread_id, author_user_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, author_user_id, body, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(AgoraError::not_found("thread").into());
                }
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            let reply = conn.query_row(
                &format!("{} WHERE r.id = ?1", REPLY_SELECT),
                [id],
                reply_from_row,
            )?;
            Ok(reply)
        })
    }

    pub fn list_replies(&self, thread_id: i64) -> Result<Vec<Reply>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE r.thread_id = ?1 ORDER BY r.created_at ASC, r.id ASC",
                REPLY_SELECT
            ))?;
            let rows = stmt
                .query_map([thread_id], reply_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_reply_author(&self, reply_id: i64) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT author_user_id FROM replies WHERE id = ?1", [reply_id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    /// Returns false when no such reply existed.
    pub fn delete_reply(&self, reply_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM replies WHERE id = ?1", [reply_id])?;
            Ok(deleted > 0)
        })
    }

    pub fn count_replies(&self, thread_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM replies WHERE thread_id = ?1",
                [thread_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn upsert_creates_then_refreshes() {
        let db = testing::db();
        let identity = ExternalIdentity {
            external_id: "idp_ada".into(),
            display_name: Some("Ada".into()),
            avatar_url: Some("https://img/ada.png".into()),
        };
        let first = db.upsert_user_from_identity(&identity).unwrap();
        assert!(first.id > 0);

        let refreshed = db
            .upsert_user_from_identity(&ExternalIdentity {
                display_name: Some("Ada Lovelace".into()),
                avatar_url: None,
                ..identity
            })
            .unwrap();
        assert_eq!(refreshed.id, first.id);
        assert_eq!(refreshed.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(refreshed.avatar_url.as_deref(), Some("https://img/ada.png"));
    }

    #[test]
    fn duplicate_handle_is_conflict() {
        let db = testing::db();
        let ada = testing::user(&db, "idp_ada", "Ada");
        let bob = testing::user(&db, "idp_bob", "Bob");

        let claim = UpdateProfileRequest { handle: Some("ada".into()), ..Default::default() };
        db.update_user_profile(ada, &claim).unwrap();

        let err = db.update_user_profile(bob, &claim).unwrap_err();
        assert!(matches!(AgoraError::from(err), AgoraError::Conflict(_)));
    }

    #[test]
    fn list_threads_filters_and_pages() {
        let db = testing::db();
        let ada = testing::user(&db, "idp_ada", "Ada");
        let help = db.get_category_id_by_slug("help").unwrap().unwrap();
        testing::thread(&db, ada, "Soil pH basics");
        db.create_thread(help, ada, "How do I test 100% of soil?", "Looking for a kit.").unwrap();
        testing::thread(&db, ada, "Rainwater tanks");

        let all = db.list_threads(&ThreadFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "Rainwater tanks");

        let help_only = db
            .list_threads(&ThreadFilter { category_slug: Some("help".into()), ..Default::default() })
            .unwrap();
        assert_eq!(help_only.len(), 1);

        let search = db
            .list_threads(&ThreadFilter { search: Some("SOIL".into()), ..Default::default() })
            .unwrap();
        assert_eq!(search.len(), 2);

        let literal_percent = db
            .list_threads(&ThreadFilter { search: Some("100%".into()), ..Default::default() })
            .unwrap();
        assert_eq!(literal_percent.len(), 1);

        let second_page = db
            .list_threads(&ThreadFilter { page: 2, page_size: 2, newest_first: false, ..Default::default() })
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].title, "Rainwater tanks");
    }

    #[test]
    fn replies_hydrate_author_and_delete() {
        let db = testing::db();
        let ada = testing::user(&db, "idp_ada", "Ada");
        let bob = testing::user(&db, "idp_bob", "Bob");
        let thread = testing::thread(&db, ada, "Seed swaps");

        let reply = db.create_reply(thread, bob, "I have beans").unwrap();
        assert_eq!(reply.author.display_name.as_deref(), Some("Bob"));
        assert_eq!(db.get_reply_author(reply.id).unwrap(), Some(bob));
        assert_eq!(db.count_replies(thread).unwrap(), 1);

        assert!(db.delete_reply(reply.id).unwrap());
        assert!(!db.delete_reply(reply.id).unwrap());
        assert!(db.list_replies(thread).unwrap().is_empty());
    }

    #[test]
    fn reply_on_missing_thread_is_not_found() {
        let db = testing::db();
        let bob = testing::user(&db, "idp_bob", "Bob");
        let err = db.create_reply(999, bob, "hello?").unwrap_err();
        assert_eq!(AgoraError::from(err), AgoraError::not_found("thread"));
    }
}
