//! v002 -- Friend and group requests.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id           TEXT PRIMARY KEY NOT NULL,    -- '{type}_{flag}_{time}'
    flag         TEXT NOT NULL UNIQUE,         -- gateway handle used to answer
    time         INTEGER NOT NULL,
    request_type TEXT NOT NULL,                -- 'friend' | 'group'
    sub_type     TEXT,                         -- 'add' | 'invite'
    user_id      INTEGER NOT NULL,
    group_id     INTEGER,
    comment      TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT 'pending',
    is_read      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_requests_time
    ON requests(time DESC);
"#;

/// Apply the migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
