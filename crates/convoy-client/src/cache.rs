//! Durable cache facade used by the sync engine.
//!
//! Wraps [`convoy_store::Database`] so that no cache failure ever reaches the
//! caller: errors are logged and reported as a miss or a no-op.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use convoy_shared::{ChatRoom, Message, MessageId, MessagePatch, RoomId};
use convoy_store::{Database, StoreError};

/// Random identifier for a fresh installation, passed to
/// [`DurableCache::ensure_install`] on later launches.
pub fn new_install_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct DurableCache {
    db: Option<Mutex<Database>>,
}

impl DurableCache {
    pub fn new(db: Database) -> Self {
        Self {
            db: Some(Mutex::new(db)),
        }
    }

    /// Open the cache at `path` (or the platform default). Falls back to a
    /// disabled cache when the database cannot be opened.
    pub fn open(path: Option<&Path>) -> Self {
        let opened = match path {
            Some(path) => Database::open_at(path),
            None => Database::new(),
        };
        match opened {
            Ok(db) => Self::new(db),
            Err(e) => {
                tracing::warn!(error = %e, "cache unavailable, continuing without it");
                Self::disabled()
            }
        }
    }

    pub fn in_memory() -> Self {
        match Database::open_in_memory() {
            Ok(db) => Self::new(db),
            Err(e) => {
                tracing::warn!(error = %e, "in-memory cache unavailable");
                Self::disabled()
            }
        }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self { db: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    fn with_db<T>(&self, op: &'static str, fallback: T, f: impl FnOnce(&Database) -> Result<T, StoreError>) -> T {
        let Some(db) = &self.db else {
            return fallback;
        };
        let guard: MutexGuard<'_, Database> = db.lock().unwrap_or_else(|e| e.into_inner());
        match f(&guard) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(op, error = %e, "cache operation failed, treating as miss");
                fallback
            }
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn has_messages(&self, room_id: &RoomId) -> bool {
        self.with_db("has_messages", false, |db| db.has_messages(room_id))
    }

    pub fn get_messages(&self, room_id: &RoomId, limit: u32, offset: u32) -> Vec<Message> {
        self.with_db("get_messages", Vec::new(), |db| {
            db.get_messages(room_id, limit, offset)
        })
    }

    pub fn get_message(&self, message_id: &MessageId) -> Option<Message> {
        self.with_db("get_message", None, |db| db.get_message(message_id))
    }

    /// Returns `true` only when the message was not cached before.
    pub fn insert_message(&self, room_id: &RoomId, message: &Message) -> bool {
        self.with_db("insert_message", false, |db| db.insert_message(room_id, message))
    }

    pub fn save_messages(&self, room_id: &RoomId, messages: &[Message]) {
        self.with_db("save_messages", (), |db| db.save_messages(room_id, messages))
    }

    pub fn update_message(&self, message_id: &MessageId, patch: &MessagePatch) {
        self.with_db("update_message", (), |db| {
            db.update_message(message_id, patch).map(|_| ())
        })
    }

    pub fn clear_messages(&self, room_id: &RoomId) {
        self.with_db("clear_messages", (), |db| db.clear_messages(room_id).map(|_| ()))
    }

    pub fn clear_all_messages(&self) {
        self.with_db("clear_all_messages", (), |db| {
            db.clear_all_messages().map(|_| ())
        })
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub fn save_rooms(&self, rooms: &[ChatRoom]) {
        self.with_db("save_rooms", (), |db| db.save_rooms(rooms))
    }

    pub fn get_rooms(&self) -> Vec<ChatRoom> {
        self.with_db("get_rooms", Vec::new(), |db| db.get_rooms())
    }

    pub fn is_cache_fresh(&self, max_age_minutes: i64) -> bool {
        self.with_db("is_cache_fresh", false, |db| {
            db.is_room_cache_fresh(max_age_minutes)
        })
    }

    pub fn clear_rooms(&self) {
        self.with_db("clear_rooms", (), |db| db.clear_rooms())
    }

    // ------------------------------------------------------------------
    // Install marker
    // ------------------------------------------------------------------

    /// Purge cached data written by a different installation. Returns `true`
    /// when a purge happened.
    pub fn ensure_install(&self, install_id: &str) -> bool {
        self.with_db("ensure_install", false, |db| {
            if db.install_marker()?.as_deref() == Some(install_id) {
                return Ok(false);
            }
            db.clear_all_messages()?;
            db.clear_rooms()?;
            db.set_install_marker(install_id)?;
            tracing::info!(install_id, "fresh install detected, cache purged");
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_shared::{UserId, UserRef};

    fn msg(id: &str) -> Message {
        Message {
            id: MessageId::new(id),
            room_id: RoomId::new("r1"),
            sender: UserRef {
                id: UserId::new("dispatch"),
                name: None,
                avatar: None,
            },
            content: Some("ETA?".into()),
            file: None,
            is_read: false,
            read_by: Default::default(),
            created_at: Utc::now(),
            reply_to: None,
        }
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = DurableCache::disabled();
        let room = RoomId::new("r1");
        cache.save_messages(&room, &[msg("a")]);

        assert!(!cache.has_messages(&room));
        assert!(cache.get_messages(&room, 50, 0).is_empty());
        assert!(!cache.is_cache_fresh(5));
    }

    #[test]
    fn install_ids_are_unique() {
        assert_ne!(new_install_id(), new_install_id());
    }

    #[test]
    fn install_change_purges_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DurableCache::open(Some(&dir.path().join("cache.db")));
        let room = RoomId::new("r1");

        assert!(cache.ensure_install("install-a"));
        cache.save_messages(&room, &[msg("a")]);
        assert!(!cache.ensure_install("install-a"));
        assert!(cache.has_messages(&room));

        assert!(cache.ensure_install("install-b"));
        assert!(!cache.has_messages(&room));
    }

    #[test]
    fn broken_schema_is_a_miss_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.conn().execute_batch("DROP TABLE cached_messages").unwrap();
        let cache = DurableCache::new(db);

        assert!(!cache.has_messages(&RoomId::new("r1")));
        cache.save_messages(&RoomId::new("r1"), &[msg("a")]);
        assert!(cache.get_messages(&RoomId::new("r1"), 10, 0).is_empty());
    }
}
