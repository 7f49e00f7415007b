//! Cached room list and its staleness clock.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use convoy_shared::ChatRoom;

use crate::database::Database;
use crate::error::Result;
use crate::meta::KEY_ROOMS_SAVED_AT;

impl Database {
    /// Replace the cached room list and restart the staleness clock.
    pub fn save_rooms(&self, rooms: &[ChatRoom]) -> Result<()> {
        self.save_rooms_at(rooms, Utc::now())
    }

    pub(crate) fn save_rooms_at(&self, rooms: &[ChatRoom], saved_at: DateTime<Utc>) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute("DELETE FROM cached_rooms", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO cached_rooms (id, position, payload) VALUES (?1, ?2, ?3)",
            )?;
            for (position, room) in rooms.iter().enumerate() {
                stmt.execute(params![
                    room.id.as_str(),
                    position as i64,
                    serde_json::to_string(room)?,
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![KEY_ROOMS_SAVED_AT, saved_at.to_rfc3339()],
        )?;

        tx.commit()?;
        tracing::debug!(count = rooms.len(), "saved cached room list");
        Ok(())
    }

    /// Cached rooms in the order they were saved.
    pub fn get_rooms(&self) -> Result<Vec<ChatRoom>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT payload FROM cached_rooms ORDER BY position ASC")?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(serde_json::from_str::<ChatRoom>(&row?)?);
        }
        Ok(rooms)
    }

    /// When the room list was last saved.
    pub fn rooms_saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.get_meta(KEY_ROOMS_SAVED_AT)? else {
            return Ok(None);
        };
        let saved_at = DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc);
        Ok(Some(saved_at))
    }

    /// Whether the room list was saved no more than `max_age_minutes` ago.
    pub fn is_room_cache_fresh(&self, max_age_minutes: i64) -> Result<bool> {
        Ok(match self.rooms_saved_at()? {
            Some(saved_at) => Utc::now() - saved_at <= Duration::minutes(max_age_minutes),
            None => false,
        })
    }

    pub fn clear_rooms(&self) -> Result<()> {
        self.conn().execute("DELETE FROM cached_rooms", [])?;
        self.delete_meta(KEY_ROOMS_SAVED_AT)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_shared::{RoomId, RoomKind};

    fn room(id: &str) -> ChatRoom {
        ChatRoom {
            id: RoomId::new(id),
            kind: RoomKind::Load,
            name: Some(format!("Load {id}")),
            avatar: None,
            participants: Vec::new(),
            is_muted: false,
            is_pinned: false,
            unread_count: 3,
            last_message: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn keeps_saved_order() {
        let db = Database::open_in_memory().unwrap();
        db.save_rooms(&[room("b"), room("a"), room("c")]).unwrap();

        let ids: Vec<String> = db
            .get_rooms()
            .unwrap()
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn freshness_follows_the_save_clock() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_room_cache_fresh(5).unwrap());

        db.save_rooms(&[room("a")]).unwrap();
        assert!(db.is_room_cache_fresh(5).unwrap());

        db.save_rooms_at(&[room("a")], Utc::now() - Duration::minutes(6))
            .unwrap();
        assert!(!db.is_room_cache_fresh(5).unwrap());
    }

    #[test]
    fn clear_resets_clock() {
        let db = Database::open_in_memory().unwrap();
        db.save_rooms(&[room("a")]).unwrap();
        db.clear_rooms().unwrap();

        assert!(db.get_rooms().unwrap().is_empty());
        assert!(db.rooms_saved_at().unwrap().is_none());
    }
}
