use agora_types::models::{Notification, NotificationKind};
use agora_types::{AgoraError, UserId};
use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::models::{NOTIFICATION_SELECT, NotificationRow};
use crate::{Database, OptionalExt, is_check_violation, is_foreign_key_violation};

impl Database {
    /// Insert a notification and read it back hydrated, under one lock hold.
    /// The schema refuses rows where the actor is the recipient.
    pub fn create_notification(
        &self,
        recipient: UserId,
        actor: UserId,
        thread_id: i64,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO notifications (user_id, actor_user_id, thread_id, type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![recipient, actor, thread_id, kind.as_str(), now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_check_violation(&e) => {
                    return Err(AgoraError::validation("actor cannot notify themselves").into());
                }
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(AgoraError::not_found("thread or user").into());
                }
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                &format!("{} WHERE n.id = ?1", NOTIFICATION_SELECT),
                [id],
                NotificationRow::from_row,
            )?;
            Notification::try_from(row)
        })
    }

    pub fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE n.id = ?1", NOTIFICATION_SELECT),
                [id],
                NotificationRow::from_row,
            )
            .optional()
        })?;
        row.map(Notification::try_from).transpose()
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: UserId, unread_only: bool) -> Result<Vec<Notification>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE n.user_id = ?1 AND (?2 = 0 OR n.read_at IS NULL)
                 ORDER BY n.created_at DESC, n.id DESC",
                NOTIFICATION_SELECT
            ))?;
            let rows = stmt
                .query_map(params![user_id, unread_only], NotificationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Only the recipient can mark a notification read. The first read time sticks.
    pub fn mark_notification_read(&self, user_id: UserId, notification_id: i64) -> Result<()> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read_at = COALESCE(read_at, ?3)
                 WHERE id = ?1 AND user_id = ?2",
                params![notification_id, user_id, now],
            )?;
            if updated == 0 {
                return Err(AgoraError::not_found("notification").into());
            }
            Ok(())
        })
    }

    /// Returns how many notifications flipped from unread to read.
    pub fn mark_all_notifications_read(&self, user_id: UserId) -> Result<usize> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read_at = ?2 WHERE user_id = ?1 AND read_at IS NULL",
                params![user_id, now],
            )?;
            Ok(updated)
        })
    }
}
