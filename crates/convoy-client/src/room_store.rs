//! Authoritative in-memory table of rooms and their timelines.
//!
//! Every mutation is synchronous: the new state is visible to readers and a
//! [`StoreEvent`] has been published to subscribers by the time the call
//! returns. Writers only go through the replace/upsert/delta operations below.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use convoy_shared::timeline;
use convoy_shared::{ChatRoom, Message, MessageId, RoomId};

/// Change notification published after each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    MessagesChanged { room_id: RoomId },
    RoomChanged { room_id: RoomId },
    RoomRemoved { room_id: RoomId },
    RoomsReplaced,
    UnreadChanged { room_id: RoomId, unread_count: u32 },
    Reset,
}

#[derive(Debug, Default)]
struct StoreInner {
    rooms: HashMap<RoomId, ChatRoom>,
    messages: HashMap<RoomId, Vec<Message>>,
}

#[derive(Debug)]
pub struct RoomStore {
    inner: Mutex<StoreInner>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RoomStore {
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Mutex::new(StoreInner::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Room timeline, ascending by `createdAt`.
    pub fn messages(&self, room_id: &RoomId) -> Vec<Message> {
        self.lock().messages.get(room_id).cloned().unwrap_or_default()
    }

    pub fn has_messages(&self, room_id: &RoomId) -> bool {
        self.lock()
            .messages
            .get(room_id)
            .is_some_and(|m| !m.is_empty())
    }

    /// Replace a room's timeline. The list is de-duplicated and sorted.
    pub fn set_messages(&self, room_id: &RoomId, messages: Vec<Message>) {
        let normalized = timeline::normalize(messages);
        self.lock().messages.insert(room_id.clone(), normalized);
        self.emit(StoreEvent::MessagesChanged {
            room_id: room_id.clone(),
        });
    }

    /// Insert a message or fold it into the stored copy with the same id.
    /// Returns `true` when the id was new to the room.
    pub fn upsert_message(&self, room_id: &RoomId, message: Message) -> bool {
        let inserted = {
            let mut inner = self.lock();
            let list = inner.messages.entry(room_id.clone()).or_default();
            match list.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => {
                    existing.absorb(&message);
                    false
                }
                None => {
                    list.push(message);
                    timeline::sort_messages(list);
                    true
                }
            }
        };
        self.emit(StoreEvent::MessagesChanged {
            room_id: room_id.clone(),
        });
        inserted
    }

    pub fn find_message(&self, message_id: &MessageId) -> Option<(RoomId, Message)> {
        let inner = self.lock();
        inner.messages.iter().find_map(|(room_id, list)| {
            list.iter()
                .find(|m| &m.id == message_id)
                .map(|m| (room_id.clone(), m.clone()))
        })
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub fn room(&self, room_id: &RoomId) -> Option<ChatRoom> {
        self.lock().rooms.get(room_id).cloned()
    }

    /// All rooms, most recently updated first.
    pub fn rooms(&self) -> Vec<ChatRoom> {
        let mut rooms: Vec<ChatRoom> = self.lock().rooms.values().cloned().collect();
        rooms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    pub fn upsert_room(&self, room: ChatRoom) {
        let room_id = room.id.clone();
        self.lock().rooms.insert(room_id.clone(), room);
        self.emit(StoreEvent::RoomChanged { room_id });
    }

    /// Replace the whole room list. Timelines of rooms that disappear are
    /// dropped with them.
    pub fn replace_rooms(&self, rooms: Vec<ChatRoom>) {
        {
            let mut inner = self.lock();
            inner.rooms = rooms.into_iter().map(|r| (r.id.clone(), r)).collect();
            let StoreInner { rooms, messages } = &mut *inner;
            messages.retain(|room_id, _| rooms.contains_key(room_id));
        }
        self.emit(StoreEvent::RoomsReplaced);
    }

    pub fn remove_room(&self, room_id: &RoomId) -> Option<ChatRoom> {
        let removed = {
            let mut inner = self.lock();
            inner.messages.remove(room_id);
            inner.rooms.remove(room_id)
        };
        self.emit(StoreEvent::RoomRemoved {
            room_id: room_id.clone(),
        });
        removed
    }

    // ------------------------------------------------------------------
    // Unread counters
    // ------------------------------------------------------------------

    /// Shift a room's unread count, clamping at zero. Returns the new value,
    /// or `None` when the room is unknown.
    pub fn apply_unread_delta(&self, room_id: &RoomId, delta: i64) -> Option<u32> {
        let updated = {
            let mut inner = self.lock();
            inner.rooms.get_mut(room_id).map(|room| {
                let next = (room.unread_count as i64 + delta).clamp(0, u32::MAX as i64);
                room.unread_count = next as u32;
                room.unread_count
            })
        };
        if let Some(unread_count) = updated {
            self.emit(StoreEvent::UnreadChanged {
                room_id: room_id.clone(),
                unread_count,
            });
        }
        updated
    }

    pub fn set_unread_absolute(&self, room_id: &RoomId, value: u32) -> bool {
        let found = {
            let mut inner = self.lock();
            match inner.rooms.get_mut(room_id) {
                Some(room) => {
                    room.unread_count = value;
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(StoreEvent::UnreadChanged {
                room_id: room_id.clone(),
                unread_count: value,
            });
        }
        found
    }

    pub fn total_unread(&self) -> u64 {
        self.lock()
            .rooms
            .values()
            .map(|r| u64::from(r.unread_count))
            .sum()
    }

    /// Drop everything (logout, fresh install).
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.rooms.clear();
            inner.messages.clear();
        }
        self.emit(StoreEvent::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use convoy_shared::{RoomKind, UserId, UserRef};

    fn room(id: &str, minutes: i64) -> ChatRoom {
        ChatRoom {
            id: RoomId::new(id),
            kind: RoomKind::Group,
            name: Some(id.to_uppercase()),
            avatar: None,
            participants: Vec::new(),
            is_muted: false,
            is_pinned: false,
            unread_count: 0,
            last_message: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn msg(id: &str, minute: i64, read_by: &[&str]) -> Message {
        Message {
            id: MessageId::new(id),
            room_id: RoomId::new("r1"),
            sender: UserRef {
                id: UserId::new("dispatch"),
                name: None,
                avatar: None,
            },
            content: Some(id.into()),
            file: None,
            is_read: !read_by.is_empty(),
            read_by: read_by.iter().map(|u| UserId::new(*u)).collect(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            reply_to: None,
        }
    }

    #[test]
    fn mutations_are_visible_and_published_before_return() {
        let store = RoomStore::default();
        let mut rx = store.subscribe();
        let r1 = RoomId::new("r1");

        store.set_messages(&r1, vec![msg("b", 2, &[]), msg("a", 1, &[])]);

        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::MessagesChanged { room_id: r1.clone() }
        );
        let ids: Vec<String> = store.messages(&r1).into_iter().map(|m| m.id.0).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn upsert_merges_duplicates() {
        let store = RoomStore::default();
        let r1 = RoomId::new("r1");
        store.set_messages(&r1, vec![msg("a", 1, &["u1"])]);

        assert!(!store.upsert_message(&r1, msg("a", 1, &["u2"])));
        assert!(store.upsert_message(&r1, msg("0", 0, &[])));

        let messages = store.messages(&r1);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id.as_str(), "0");
        assert_eq!(messages[1].read_by.len(), 2);
        assert_eq!(store.find_message(&MessageId::new("a")).unwrap().0, r1);
    }

    #[test]
    fn unread_delta_clamps_at_zero() {
        let store = RoomStore::default();
        store.upsert_room(room("r1", 0));
        let r1 = RoomId::new("r1");

        assert_eq!(store.apply_unread_delta(&r1, 3), Some(3));
        assert_eq!(store.apply_unread_delta(&r1, -5), Some(0));
        assert!(store.set_unread_absolute(&r1, 7));
        assert_eq!(store.total_unread(), 7);
        assert_eq!(store.apply_unread_delta(&RoomId::new("nope"), 1), None);
    }

    #[test]
    fn rooms_sorted_newest_first_and_removal_drops_timeline() {
        let store = RoomStore::default();
        store.replace_rooms(vec![room("old", 1), room("new", 9)]);
        store.set_messages(&RoomId::new("old"), vec![msg("a", 1, &[])]);

        let ids: Vec<String> = store.rooms().into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, ["new", "old"]);

        store.remove_room(&RoomId::new("old"));
        assert!(!store.has_messages(&RoomId::new("old")));
        assert!(store.room(&RoomId::new("old")).is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let store = RoomStore::default();
        store.upsert_room(room("r1", 0));
        store.set_messages(&RoomId::new("r1"), vec![msg("a", 1, &[])]);
        store.reset();

        assert!(store.rooms().is_empty());
        assert!(!store.has_messages(&RoomId::new("r1")));
    }
}
