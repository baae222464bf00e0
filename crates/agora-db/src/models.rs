//! Database row types. These map directly to SQLite rows (joined where the
//! caller always needs display attributes). Converted into `agora-types`
//! models at the crate boundary.

use agora_types::UserId;
use agora_types::models::{
    CategoryRef, DirectMessage, Notification, NotificationKind, Reply, Thread, ThreadTitle, User,
    UserSummary,
};
use chrono::{DateTime, Utc};
use rusqlite::Row;

#[derive(Debug)]
pub struct UserRow {
    pub id: UserId,
    pub external_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str =
    "id, external_id, display_name, handle, avatar_url, bio, created_at, updated_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_id: row.get(1)?,
            display_name: row.get(2)?,
            handle: row.get(3)?,
            avatar_url: row.get(4)?,
            bio: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            external_id: row.external_id,
            display_name: row.display_name,
            handle: row.handle,
            avatar_url: row.avatar_url,
            bio: row.bio,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Reads `display_name, handle, avatar_url` starting at column `at`.
pub(crate) fn summary_at(row: &Row<'_>, at: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        display_name: row.get(at)?,
        handle: row.get(at + 1)?,
        avatar_url: row.get(at + 2)?,
    })
}

pub struct ThreadRow {
    pub id: i64,
    pub author_user_id: UserId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_slug: String,
    pub category_name: String,
    pub author: UserSummary,
}

pub const THREAD_SELECT: &str =
    "SELECT t.id, t.author_user_id, t.title, t.body, t.created_at, t.updated_at,
            c.slug, c.name, u.display_name, u.handle, u.avatar_url
     FROM threads t
     JOIN categories c ON c.id = t.category_id
     JOIN users u ON u.id = t.author_user_id";

impl ThreadRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author_user_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            category_slug: row.get(6)?,
            category_name: row.get(7)?,
            author: summary_at(row, 8)?,
        })
    }
}

impl From<ThreadRow> for Thread {
    fn from(row: ThreadRow) -> Self {
        Thread {
            id: row.id,
            author_user_id: row.author_user_id,
            title: row.title,
            body: row.body,
            created_at: row.created_at,
            updated_at: row.updated_at,
            category: CategoryRef {
                slug: row.category_slug,
                name: row.category_name,
            },
            author: row.author,
        }
    }
}

pub const REPLY_SELECT: &str =
    "SELECT r.id, r.thread_id, r.author_user_id, r.body, r.created_at,
            u.display_name, u.handle, u.avatar_url
     FROM replies r
     JOIN users u ON u.id = r.author_user_id";

pub(crate) fn reply_from_row(row: &Row<'_>) -> rusqlite::Result<Reply> {
    Ok(Reply {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        author_user_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        author: summary_at(row, 5)?,
    })
}

pub struct NotificationRow {
    pub id: i64,
    pub kind: String,
    pub user_id: UserId,
    pub actor_user_id: UserId,
    pub thread_id: i64,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub actor: UserSummary,
    pub thread_title: String,
}

pub const NOTIFICATION_SELECT: &str =
    "SELECT n.id, n.type, n.user_id, n.actor_user_id, n.thread_id, n.created_at, n.read_at,
            a.display_name, a.handle, a.avatar_url, t.title
     FROM notifications n
     JOIN users a ON a.id = n.actor_user_id
     JOIN threads t ON t.id = n.thread_id";

impl NotificationRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            user_id: row.get(2)?,
            actor_user_id: row.get(3)?,
            thread_id: row.get(4)?,
            created_at: row.get(5)?,
            read_at: row.get(6)?,
            actor: summary_at(row, 7)?,
            thread_title: row.get(10)?,
        })
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> anyhow::Result<Self> {
        let kind: NotificationKind = row
            .kind
            .parse()
            .map_err(|e: String| anyhow::anyhow!("corrupt notification {}: {}", row.id, e))?;

        Ok(Notification {
            id: row.id,
            kind,
            user_id: row.user_id,
            actor_user_id: row.actor_user_id,
            thread_id: row.thread_id,
            created_at: row.created_at,
            read_at: row.read_at,
            actor: row.actor,
            thread: ThreadTitle {
                title: row.thread_title,
            },
        })
    }
}

pub const DIRECT_MESSAGE_SELECT: &str =
    "SELECT m.id, m.sender_id, m.recipient_id, m.body, m.image_url, m.created_at,
            s.display_name, s.handle, s.avatar_url,
            r.display_name, r.handle, r.avatar_url
     FROM direct_messages m
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.recipient_id";

pub(crate) fn direct_message_from_row(row: &Row<'_>) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        id: row.get(0)?,
        sender_user_id: row.get(1)?,
        recipient_user_id: row.get(2)?,
        body: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
        sender: summary_at(row, 6)?,
        recipient: summary_at(row, 9)?,
    })
}

/// Filter for the thread listing, already clamped by the caller.
#[derive(Debug, Clone)]
pub struct ThreadFilter {
    pub page: u32,
    pub page_size: u32,
    pub category_slug: Option<String>,
    pub search: Option<String>,
    pub newest_first: bool,
}

impl Default for ThreadFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            category_slug: None,
            search: None,
            newest_first: true,
        }
    }
}
