//! Cached message timelines.

use chrono::SecondsFormat;
use rusqlite::{params, OptionalExtension};

use convoy_shared::{Message, MessageId, MessagePatch, RoomId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn has_messages(&self, room_id: &RoomId) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM cached_messages WHERE room_id = ?1)",
            params![room_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Return the `limit` newest messages after skipping the `offset` newest,
    /// in ascending display order.
    pub fn get_messages(&self, room_id: &RoomId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT payload
             FROM cached_messages
             WHERE room_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![room_id.as_str(), limit, offset], |row| {
            row.get::<_, String>(0)
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(serde_json::from_str::<Message>(&row?)?);
        }
        messages.reverse();
        Ok(messages)
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM cached_messages WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let message = payload
            .map(|p| serde_json::from_str::<Message>(&p))
            .transpose()?;
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Replace the cached timeline of a room. Saving the same list twice
    /// leaves the cache unchanged.
    pub fn save_messages(&self, room_id: &RoomId, messages: &[Message]) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "DELETE FROM cached_messages WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO cached_messages (id, room_id, created_at, payload)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for message in messages {
                stmt.execute(params![
                    message.id.as_str(),
                    room_id.as_str(),
                    message
                        .created_at
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                    serde_json::to_string(message)?,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(room = %room_id, count = messages.len(), "saved cached messages");
        Ok(())
    }

    /// Add one message to a room's cached timeline, leaving an existing copy
    /// untouched. Returns `false` when the id was already cached.
    pub fn insert_message(&self, room_id: &RoomId, message: &Message) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO cached_messages (id, room_id, created_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message.id.as_str(),
                room_id.as_str(),
                message
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                serde_json::to_string(message)?,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Patch the read state of one cached message without rewriting the
    /// room's timeline. Returns `false` when the message is not cached.
    pub fn update_message(&self, id: &MessageId, patch: &MessagePatch) -> Result<bool> {
        let Some(mut message) = self.get_message(id)? else {
            return Ok(false);
        };

        patch.apply(&mut message);

        let affected = self.conn().execute(
            "UPDATE cached_messages SET payload = ?2 WHERE id = ?1",
            params![id.as_str(), serde_json::to_string(&message)?],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn clear_messages(&self, room_id: &RoomId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM cached_messages WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;
        Ok(affected)
    }

    pub fn clear_all_messages(&self) -> Result<usize> {
        let affected = self.conn().execute("DELETE FROM cached_messages", [])?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use convoy_shared::{UserId, UserRef};

    fn msg(room: &str, id: &str, minute: i64) -> Message {
        Message {
            id: MessageId::new(id),
            room_id: RoomId::new(room),
            sender: UserRef {
                id: UserId::new("dispatch"),
                name: Some("Dispatch".into()),
                avatar: None,
            },
            content: Some(format!("message {id}")),
            file: None,
            is_read: false,
            read_by: Default::default(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
                + Duration::minutes(minute),
            reply_to: None,
        }
    }

    #[test]
    fn save_and_page_through_messages() {
        let db = Database::open_in_memory().unwrap();
        let room = RoomId::new("r1");
        let messages: Vec<Message> = (0..5).map(|i| msg("r1", &format!("m{i}"), i)).collect();

        assert!(!db.has_messages(&room).unwrap());
        db.save_messages(&room, &messages).unwrap();
        assert!(db.has_messages(&room).unwrap());

        let newest = db.get_messages(&room, 2, 0).unwrap();
        let ids: Vec<&str> = newest.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m4"]);

        let older = db.get_messages(&room, 2, 2).unwrap();
        let ids: Vec<&str> = older.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn save_overwrites_previous_timeline() {
        let db = Database::open_in_memory().unwrap();
        let room = RoomId::new("r1");

        db.save_messages(&room, &[msg("r1", "a", 0), msg("r1", "b", 1)])
            .unwrap();
        db.save_messages(&room, &[msg("r1", "c", 2)]).unwrap();
        db.save_messages(&room, &[msg("r1", "c", 2)]).unwrap();

        let all = db.get_messages(&room, 100, 0).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_str(), "c");
    }

    #[test]
    fn update_patches_read_state_only() {
        let db = Database::open_in_memory().unwrap();
        let room = RoomId::new("r1");
        db.save_messages(&room, &[msg("r1", "a", 0)]).unwrap();

        let patch = MessagePatch {
            is_read: Some(true),
            read_by: Some([UserId::new("me")].into_iter().collect()),
        };
        assert!(db.update_message(&MessageId::new("a"), &patch).unwrap());
        assert!(!db.update_message(&MessageId::new("zzz"), &patch).unwrap());

        let cached = db.get_message(&MessageId::new("a")).unwrap().unwrap();
        assert!(cached.is_read);
        assert!(cached.is_read_by(&UserId::new("me")));
        assert_eq!(cached.content.as_deref(), Some("message a"));
    }

    #[test]
    fn insert_appends_without_clobbering() {
        let db = Database::open_in_memory().unwrap();
        let room = RoomId::new("r1");
        db.save_messages(&room, &[msg("r1", "a", 0), msg("r1", "b", 1)])
            .unwrap();

        assert!(db.insert_message(&room, &msg("r1", "c", 2)).unwrap());

        let mut changed = msg("r1", "a", 0);
        changed.content = Some("edited".into());
        assert!(!db.insert_message(&room, &changed).unwrap());

        let all = db.get_messages(&room, 100, 0).unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(all[0].content.as_deref(), Some("message a"));
    }

    #[test]
    fn clear_is_scoped_per_room() {
        let db = Database::open_in_memory().unwrap();
        db.save_messages(&RoomId::new("r1"), &[msg("r1", "a", 0)])
            .unwrap();
        db.save_messages(&RoomId::new("r2"), &[msg("r2", "b", 0)])
            .unwrap();

        assert_eq!(db.clear_messages(&RoomId::new("r1")).unwrap(), 1);
        assert!(db.has_messages(&RoomId::new("r2")).unwrap());

        db.clear_all_messages().unwrap();
        assert!(!db.has_messages(&RoomId::new("r2")).unwrap());
    }
}
