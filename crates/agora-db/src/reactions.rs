//! Thread reactions: at most one per (thread, user), enforced by the
//! `uniq_thread_reaction` constraint rather than a read-then-write check.

use agora_types::models::ThreadCounts;
use agora_types::{AgoraError, UserId};
use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::{Database, is_foreign_key_violation, is_unique_violation};

impl Database {
    /// A second like for the same pair fails with `Conflict` and writes nothing.
    pub fn like_once(&self, thread_id: i64, user_id: UserId) -> Result<()> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO thread_reactions (thread_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![thread_id, user_id, now],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(AgoraError::Conflict("thread already liked".into()).into())
                }
                Err(e) if is_foreign_key_violation(&e) => Err(AgoraError::not_found("thread").into()),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn unlike_once(&self, thread_id: i64, user_id: UserId) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM thread_reactions WHERE thread_id = ?1 AND user_id = ?2",
                params![thread_id, user_id],
            )?;
            if deleted == 0 {
                return Err(AgoraError::not_found("reaction").into());
            }
            Ok(())
        })
    }

    pub fn like_count(&self, thread_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM thread_reactions WHERE thread_id = ?1",
                [thread_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn viewer_has_liked(&self, thread_id: i64, viewer: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM thread_reactions WHERE thread_id = ?1 AND user_id = ?2",
                params![thread_id, viewer],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Pure read; an anonymous viewer has never liked anything.
    pub fn thread_counts(&self, thread_id: i64, viewer: Option<UserId>) -> Result<ThreadCounts> {
        let viewer_has_liked = match viewer {
            Some(viewer) => self.viewer_has_liked(thread_id, viewer)?,
            None => false,
        };
        Ok(ThreadCounts {
            like_count: self.like_count(thread_id)?,
            reply_count: self.count_replies(thread_id)?,
            viewer_has_liked,
        })
    }
}
