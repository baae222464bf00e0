pub mod direct_messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod queries;
pub mod reactions;

use std::path::Path;
use std::sync::{Arc, Mutex};

use agora_types::{AgoraError, AgoraResult};
use anyhow::Result;
use rusqlite::Connection;
use tracing::{error, info};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn).inspect(|_| info!("Database opened at {}", path.display()))
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run a blocking store call off the async runtime.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> AgoraResult<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                AgoraError::Store(e.to_string())
            })?
            .map_err(AgoraError::from)
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    has_extended_code(err, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        || has_extended_code(err, rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    has_extended_code(err, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

pub(crate) fn is_check_violation(err: &rusqlite::Error) -> bool {
    has_extended_code(err, rusqlite::ffi::SQLITE_CONSTRAINT_CHECK)
}

fn has_extended_code(err: &rusqlite::Error, code: std::os::raw::c_int) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == code)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agora_types::AgoraError;

    use super::testing;

    #[tokio::test]
    async fn call_keeps_domain_errors() {
        let db = Arc::new(testing::db());
        let ada = testing::user(&db, "idp_ada", "Ada");
        let thread = testing::thread(&db, ada, "Worm bins");

        db.call(move |db| db.like_once(thread, ada)).await.unwrap();
        let err = db.call(move |db| db.like_once(thread, ada)).await.unwrap_err();
        assert!(matches!(err, AgoraError::Conflict(_)));

        let count = db.call(move |db| db.like_count(thread)).await.unwrap();
        assert_eq!(count, 1);
    }
}
