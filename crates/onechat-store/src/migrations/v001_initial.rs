//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table holding every chat message seen by the
//! account, received or sent.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    local_message_id TEXT PRIMARY KEY,           -- client id; NULL on legacy rows
    timestamp        INTEGER NOT NULL,           -- unix seconds
    post_type        TEXT NOT NULL,              -- 'message' | 'message_sent'
    message_type     TEXT NOT NULL,              -- 'private' | 'group'
    scope_id         INTEGER NOT NULL,           -- peer user id or group id
    sender_id        INTEGER NOT NULL,
    sender_name      TEXT,
    message_id       INTEGER,                    -- gateway id, NULL until acked
    content          TEXT NOT NULL,              -- raw CQ markup
    send_state       TEXT,                       -- NULL for received messages
    recalled         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    data             TEXT,                       -- original event JSON
    created_at       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_timestamp
    ON messages(timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_messages_scope_ts
    ON messages(message_type, scope_id, timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_messages_message_id
    ON messages(message_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
