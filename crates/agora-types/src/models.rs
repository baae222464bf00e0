use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal user identifier. Always positive for a real user.
pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub external_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display attributes embedded in hydrated payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub id: UserId,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub created_at: DateTime<Utc>,
    pub category: CategoryRef,
    pub author: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: i64,
    pub author_user_id: UserId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: CategoryRef,
    pub author: UserSummary,
}

/// Like and reply counts derived on read, plus whether the viewer has liked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCounts {
    pub like_count: i64,
    pub reply_count: i64,
    pub viewer_has_liked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDetails {
    #[serde(flatten)]
    pub thread: Thread,
    #[serde(flatten)]
    pub counts: ThreadCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: i64,
    pub thread_id: i64,
    pub author_user_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub author: UserSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "REPLY_ON_THREAD")]
    ReplyOnThread,
    #[serde(rename = "LIKE_ON_THREAD")]
    LikeOnThread,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplyOnThread => "REPLY_ON_THREAD",
            Self::LikeOnThread => "LIKE_ON_THREAD",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REPLY_ON_THREAD" => Ok(Self::ReplyOnThread),
            "LIKE_ON_THREAD" => Ok(Self::LikeOnThread),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadTitle {
    pub title: String,
}

/// A notification hydrated with actor display attributes and the thread title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub user_id: UserId,
    pub actor_user_id: UserId,
    pub thread_id: i64,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub actor: UserSummary,
    pub thread: ThreadTitle,
}

/// A direct message hydrated with sender and recipient display attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: i64,
    pub sender_user_id: UserId,
    pub recipient_user_id: UserId,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sender: UserSummary,
    pub recipient: UserSummary,
}
