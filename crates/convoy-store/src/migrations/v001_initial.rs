//! v001 -- Initial schema creation.
//!
//! Creates the three cache tables: `cached_messages`, `cached_rooms` and
//! `cache_meta`. Message and room rows carry their full JSON payload; the
//! extra columns exist only for filtering and ordering.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (last known timeline per room)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cached_messages (
    id         TEXT PRIMARY KEY NOT NULL,
    room_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,                 -- RFC-3339, millisecond precision, UTC
    payload    TEXT NOT NULL                  -- JSON-encoded Message
);

CREATE INDEX IF NOT EXISTS idx_cached_messages_room_ts
    ON cached_messages(room_id, created_at DESC);

-- ----------------------------------------------------------------
-- Rooms (last known room list, in display order)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cached_rooms (
    id       TEXT PRIMARY KEY NOT NULL,
    position INTEGER NOT NULL,
    payload  TEXT NOT NULL                    -- JSON-encoded ChatRoom
);

-- ----------------------------------------------------------------
-- Meta (staleness clock, install marker)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cache_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
