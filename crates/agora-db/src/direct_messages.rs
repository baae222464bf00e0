use agora_types::models::DirectMessage;
use agora_types::{AgoraError, UserId};
use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use crate::models::{DIRECT_MESSAGE_SELECT, direct_message_from_row};
use crate::{Database, OptionalExt, is_check_violation, is_foreign_key_violation};

impl Database {
    /// Insert a direct message and read it back hydrated with both parties'
    /// display attributes. Body and image cannot both be absent.
    pub fn create_direct_message(
        &self,
        sender: UserId,
        recipient: UserId,
        body: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<DirectMessage> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO direct_messages (sender_id, recipient_id, body, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender, recipient, body, image_url, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_check_violation(&e) => {
                    return Err(AgoraError::validation("message body or image is required").into());
                }
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(AgoraError::not_found("recipient").into());
                }
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            let message = conn.query_row(
                &format!("{} WHERE m.id = ?1", DIRECT_MESSAGE_SELECT),
                [id],
                direct_message_from_row,
            )?;
            Ok(message)
        })
    }

    pub fn get_direct_message(&self, id: i64) -> Result<Option<DirectMessage>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE m.id = ?1", DIRECT_MESSAGE_SELECT),
                [id],
                direct_message_from_row,
            )
            .optional()
        })
    }

    /// The latest `limit` messages between two users, oldest first.
    pub fn list_conversation(&self, user: UserId, other: UserId, limit: u32) -> Result<Vec<DirectMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                     OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?3",
                DIRECT_MESSAGE_SELECT
            ))?;
            let mut rows = stmt
                .query_map(params![user, other, limit], direct_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }
}
