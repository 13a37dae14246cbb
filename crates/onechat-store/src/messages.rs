use chrono::Utc;
use onechat_shared::types::{Scope, ScopeKind, SendState};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MessageFilter, MessageStats, StoredMessage};

const MESSAGE_COLUMNS: &str = "local_message_id, timestamp, post_type, message_type, scope_id, \
     sender_id, sender_name, message_id, content, send_state, recalled, data";

impl Database {
    /// Insert a message, replacing any row with the same local id.
    pub fn save_message(&self, message: &StoredMessage) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO messages (local_message_id, timestamp, post_type, message_type,
                 scope_id, sender_id, sender_name, message_id, content, send_state, recalled,
                 data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                message.local_message_id,
                message.timestamp,
                message.post_type,
                message.scope.kind.as_str(),
                message.scope.id,
                message.sender_id,
                message.sender_name,
                message.message_id,
                message.content,
                message.send_state.map(|s| s.as_str()),
                message.recalled,
                message.data,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Rows matching `filter`, newest first.
    pub fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<StoredMessage>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(scope) = filter.scope {
            conditions.push("message_type = ? AND scope_id = ?");
            values.push(Value::Text(scope.kind.as_str().to_string()));
            values.push(Value::Integer(scope.id));
        }
        if let Some(before) = filter.before {
            conditions.push("timestamp < ?");
            values.push(Value::Integer(before));
        }
        if let Some(until) = filter.until {
            conditions.push("timestamp <= ?");
            values.push(Value::Integer(until));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        values.push(Value::Integer(i64::from(filter.limit)));
        values.push(Value::Integer(i64::from(filter.offset)));

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages {where_clause}
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ? OFFSET ?"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, local_message_id: &str) -> Result<StoredMessage> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE local_message_id = ?1"),
                params![local_message_id],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Record the gateway id assigned to a sent message and mark it acknowledged.
    ///
    /// A row that already carries a different gateway id is left alone.
    pub fn update_message_id(&self, local_message_id: &str, message_id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET message_id = ?2,
                 send_state = CASE WHEN send_state IS NULL THEN NULL ELSE 'acknowledged' END
             WHERE local_message_id = ?1 AND (message_id IS NULL OR message_id = ?2)",
            params![local_message_id, message_id],
        )?;
        Ok(affected > 0)
    }

    /// Flag every row carrying `message_id` as recalled. Returns the number of rows touched.
    pub fn mark_recalled(&self, message_id: i64) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET recalled = 1 WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(affected)
    }

    /// Replace the body of a message, e.g. once the gateway returns the final
    /// form of a sent image. Identity and timestamp are untouched.
    pub fn update_message_content(&self, local_message_id: &str, content: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?2 WHERE local_message_id = ?1",
            params![local_message_id, content],
        )?;
        Ok(affected > 0)
    }

    /// Move a pending send to `failed`. Acknowledged rows stay acknowledged.
    pub fn mark_send_failed(&self, local_message_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET send_state = 'failed'
             WHERE local_message_id = ?1 AND send_state = 'pending'",
            params![local_message_id],
        )?;
        Ok(affected > 0)
    }

    /// Substring search over message content, newest first.
    pub fn search_messages(
        &self,
        query: &str,
        scope: Option<Scope>,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        let pattern = format!("%{}%", escape_like(query));

        let mut values: Vec<Value> = vec![Value::Text(pattern)];
        let scope_clause = match scope {
            Some(scope) => {
                values.push(Value::Text(scope.kind.as_str().to_string()));
                values.push(Value::Integer(scope.id));
                "AND message_type = ? AND scope_id = ?"
            }
            None => "",
        };
        values.push(Value::Integer(i64::from(limit)));

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE content LIKE ? ESCAPE '\\' {scope_clause}
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn delete_message(&self, local_message_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE local_message_id = ?1",
            params![local_message_id],
        )?;
        Ok(affected > 0)
    }

    /// Keep only the newest `keep` rows. Returns the number of rows deleted.
    pub fn cleanup_old_messages(&self, keep: u32) -> Result<usize> {
        let deleted = self.conn().execute(
            "DELETE FROM messages WHERE rowid NOT IN (
                 SELECT rowid FROM messages ORDER BY timestamp DESC, rowid DESC LIMIT ?1
             )",
            params![keep],
        )?;
        tracing::info!(deleted, keep, "cleaned up old messages");
        Ok(deleted)
    }

    pub fn message_stats(&self) -> Result<MessageStats> {
        let stats = self.conn().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(message_type = 'private'), 0),
                    COALESCE(SUM(message_type = 'group'), 0),
                    COALESCE(SUM(recalled), 0),
                    MIN(timestamp),
                    MAX(timestamp)
             FROM messages",
            [],
            |row| {
                Ok(MessageStats {
                    total: row.get::<_, i64>(0)? as u64,
                    private: row.get::<_, i64>(1)? as u64,
                    group: row.get::<_, i64>(2)? as u64,
                    recalled: row.get::<_, i64>(3)? as u64,
                    oldest: row.get(4)?,
                    newest: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let message_type: String = row.get(3)?;
    let kind = ScopeKind::parse(&message_type).ok_or_else(|| {
        invalid_column(3, "message_type", message_type.clone())
    })?;

    let send_state = match row.get::<_, Option<String>>(9)? {
        Some(s) => Some(SendState::parse(&s).ok_or_else(|| invalid_column(9, "send_state", s))?),
        None => None,
    };

    Ok(StoredMessage {
        local_message_id: row.get(0)?,
        timestamp: row.get(1)?,
        post_type: row.get(2)?,
        scope: Scope {
            kind,
            id: row.get(4)?,
        },
        sender_id: row.get(5)?,
        sender_name: row.get(6)?,
        message_id: row.get(7)?,
        content: row.get(8)?,
        send_state,
        recalled: row.get(10)?,
        data: row.get(11)?,
    })
}

pub(crate) fn invalid_column(index: usize, column: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        Box::new(StoreError::InvalidValue { column, value }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{POST_TYPE_MESSAGE, POST_TYPE_MESSAGE_SENT};

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn received(local: &str, scope: Scope, ts: i64, remote: i64) -> StoredMessage {
        StoredMessage {
            local_message_id: Some(local.to_string()),
            timestamp: ts,
            post_type: POST_TYPE_MESSAGE.to_string(),
            scope,
            sender_id: scope.id,
            sender_name: None,
            message_id: Some(remote),
            content: format!("msg at {ts}"),
            send_state: None,
            recalled: false,
            data: None,
        }
    }

    fn pending(local: &str, scope: Scope, ts: i64) -> StoredMessage {
        StoredMessage {
            local_message_id: Some(local.to_string()),
            timestamp: ts,
            post_type: POST_TYPE_MESSAGE_SENT.to_string(),
            scope,
            sender_id: 10,
            sender_name: None,
            message_id: None,
            content: "hello".to_string(),
            send_state: Some(SendState::Pending),
            recalled: false,
            data: None,
        }
    }

    #[test]
    fn save_and_load_newest_first() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);

        db.save_message(&received("a", scope, 1000, 1)).unwrap();
        db.save_message(&received("b", scope, 1400, 3)).unwrap();
        db.save_message(&received("c", scope, 1002, 2)).unwrap();
        db.save_message(&received("x", Scope::group(42), 1500, 4)).unwrap();

        let rows = db.get_messages(&MessageFilter::scope(scope, 200)).unwrap();
        let ids: Vec<_> = rows
            .iter()
            .map(|m| m.local_message_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let all = db.get_messages(&MessageFilter::all(500)).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].scope, Scope::group(42));
    }

    #[test]
    fn before_and_limit_page_backwards() {
        let (_dir, db) = open();
        let scope = Scope::group(42);
        for (i, ts) in [100, 200, 300, 400].iter().enumerate() {
            db.save_message(&received(&format!("m{i}"), scope, *ts, i as i64))
                .unwrap();
        }

        let page = db
            .get_messages(&MessageFilter::scope(scope, 2).before(300))
            .unwrap();
        let ts: Vec<_> = page.iter().map(|m| m.timestamp).collect();
        assert_eq!(ts, vec![200, 100]);
    }

    #[test]
    fn until_and_offset_page_through_equal_timestamps() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);
        for (local, ts) in [("a", 1000), ("b", 1000), ("c", 1000), ("d", 1001)] {
            db.save_message(&received(local, scope, ts, 0)).unwrap();
        }

        let page = db
            .get_messages(&MessageFilter::scope(scope, 2).until(1000).offset(2))
            .unwrap();
        let ids: Vec<_> = page
            .iter()
            .map(|m| m.local_message_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn update_content_keeps_identity() {
        let (_dir, db) = open();
        db.save_message(&pending("abc", Scope::group(42), 1402)).unwrap();

        assert!(db.update_message_content("abc", "[CQ:image,url=x]").unwrap());
        assert!(!db.update_message_content("missing", "x").unwrap());

        let row = db.get_message("abc").unwrap();
        assert_eq!(row.content, "[CQ:image,url=x]");
        assert_eq!(row.timestamp, 1402);
    }

    #[test]
    fn save_replaces_by_local_id() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);
        db.save_message(&pending("abc", scope, 1402)).unwrap();
        db.save_message(&pending("abc", scope, 1402)).unwrap();

        assert_eq!(db.message_stats().unwrap().total, 1);
    }

    #[test]
    fn rows_without_local_id_are_kept() {
        let (_dir, db) = open();
        let mut legacy = received("unused", Scope::private(1001), 1000, 77);
        legacy.local_message_id = None;
        db.save_message(&legacy).unwrap();

        let rows = db.get_messages(&MessageFilter::all(10)).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].local_message_id.is_none());
    }

    #[test]
    fn update_message_id_acknowledges_once() {
        let (_dir, db) = open();
        db.save_message(&pending("abc", Scope::private(1001), 1402)).unwrap();

        assert!(db.update_message_id("abc", 999).unwrap());
        let row = db.get_message("abc").unwrap();
        assert_eq!(row.message_id, Some(999));
        assert_eq!(row.send_state, Some(SendState::Acknowledged));

        // A second, different id never overwrites the first.
        assert!(!db.update_message_id("abc", 1000).unwrap());
        assert_eq!(db.get_message("abc").unwrap().message_id, Some(999));
    }

    #[test]
    fn mark_failed_only_touches_pending() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);
        db.save_message(&pending("p", scope, 1)).unwrap();
        db.save_message(&pending("q", scope, 2)).unwrap();
        db.update_message_id("q", 5).unwrap();

        assert!(db.mark_send_failed("p").unwrap());
        assert!(!db.mark_send_failed("q").unwrap());
        assert_eq!(db.get_message("p").unwrap().send_state, Some(SendState::Failed));
        assert_eq!(
            db.get_message("q").unwrap().send_state,
            Some(SendState::Acknowledged)
        );
    }

    #[test]
    fn mark_recalled_by_remote_id() {
        let (_dir, db) = open();
        db.save_message(&received("a", Scope::group(42), 1000, 999)).unwrap();

        assert_eq!(db.mark_recalled(999).unwrap(), 1);
        assert_eq!(db.mark_recalled(12345).unwrap(), 0);
        assert!(db.get_message("a").unwrap().recalled);
        assert_eq!(db.message_stats().unwrap().recalled, 1);
    }

    #[test]
    fn search_escapes_wildcards() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);
        let mut a = received("a", scope, 1, 1);
        a.content = "100% sure".to_string();
        let mut b = received("b", scope, 2, 2);
        b.content = "1000 apples".to_string();
        db.save_message(&a).unwrap();
        db.save_message(&b).unwrap();

        let hits = db.search_messages("0%", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].local_message_id.as_deref(), Some("a"));

        let hits = db.search_messages("apples", Some(Scope::group(1001)), 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn cleanup_keeps_newest() {
        let (_dir, db) = open();
        let scope = Scope::private(1001);
        for i in 0..5 {
            db.save_message(&received(&format!("m{i}"), scope, i, i)).unwrap();
        }

        assert_eq!(db.cleanup_old_messages(2).unwrap(), 3);
        let stats = db.message_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.oldest, Some(3));
        assert_eq!(stats.newest, Some(4));
    }

    #[test]
    fn delete_and_missing_lookup() {
        let (_dir, db) = open();
        db.save_message(&received("a", Scope::private(1), 1, 1)).unwrap();

        assert!(db.delete_message("a").unwrap());
        assert!(!db.delete_message("a").unwrap());
        assert!(matches!(db.get_message("a"), Err(StoreError::NotFound)));
    }
}
