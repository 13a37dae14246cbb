//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use onechat_shared::constants::{APP_NAME, DB_FILE_NAME};
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Platform data directory used when no explicit one is configured.
    ///
    /// - Linux:   `~/.local/share/onechat`
    /// - macOS:   `~/Library/Application Support/com.onechat.onechat`
    /// - Windows: `{FOLDERID_RoamingAppData}\onechat\onechat\data`
    pub fn default_data_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Open (or create) the database of one account under `data_dir`.
    ///
    /// Every account lives in its own `user_<self_id>` directory so switching
    /// logins never mixes histories.
    pub fn open_for_account(data_dir: &Path, self_id: i64) -> Result<Self> {
        let account_dir = data_dir.join(format!("user_{self_id}"));
        std::fs::create_dir_all(&account_dir)?;

        let db_path = account_dir.join(DB_FILE_NAME);

        tracing::info!(self_id, path = %db_path.display(), "opening account database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());

        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn open_for_account_uses_per_user_directory() {
        let dir = tempfile::tempdir().unwrap();

        let db = Database::open_for_account(dir.path(), 10).expect("should open");
        let path = db.path().unwrap();
        assert!(path.ends_with("user_10/onechat.db"));
    }

    #[test]
    fn reopen_does_not_rerun_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Database::open_at(&path).unwrap());
        Database::open_at(&path).expect("second open should succeed");
    }
}
