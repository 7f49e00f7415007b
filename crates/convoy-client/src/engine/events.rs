//! Inbound real-time events: new messages, read receipts, presence and
//! connection lifecycle.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use convoy_shared::protocol::{InboundEvent, OutboundEvent};
use convoy_shared::{Message, MessageId, MessagePatch, RoomId, UserId};

use super::SyncEngine;

impl SyncEngine {
    /// Consume the channel's event stream until it closes.
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("event stream closed");
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::NewMessage(message) => self.on_new_message(message).await,
            InboundEvent::MessageRead {
                message_id,
                read_by,
                room_id,
            } => self.on_message_read(&message_id, &read_by, room_id.as_ref()),
            InboundEvent::MessagesMarkedAsRead {
                room_id,
                message_ids,
                user_id,
            } => self.on_messages_marked_as_read(&room_id, &message_ids, &user_id),
            InboundEvent::UserOnline { user_id, online } => {
                debug!(user = %user_id, online, "presence changed");
                self.state().presence.insert(user_id, online);
            }
            InboundEvent::Connected => info!("real-time channel connected"),
            InboundEvent::Disconnected => {
                warn!("real-time channel disconnected, rooms will reconcile on next load")
            }
            InboundEvent::Reconnected => self.on_reconnected().await,
        }
    }

    async fn on_new_message(&self, mut message: Message) {
        let user = self.inner.current_user.clone();
        let room_id = message.room_id.clone();

        let is_active = {
            let mut state = self.state();
            if let Some(session) = state.sessions.get_mut(&room_id) {
                session.is_loading_older_messages = false;
            }
            state.active_room.as_ref() == Some(&room_id)
        };

        let from_self = message.is_from(&user);
        let eager_read = is_active && !from_self && message.mark_read_by(&user);

        let timeline_loaded = is_active || self.inner.store.has_messages(&room_id);
        let inserted = if timeline_loaded {
            let inserted = self.inner.store.upsert_message(&room_id, message.clone());
            self.inner
                .cache
                .save_messages(&room_id, &self.inner.store.messages(&room_id));
            inserted
        } else {
            self.record_unloaded(&room_id, &message)
        };

        match self.inner.store.room(&room_id) {
            Some(mut room) => {
                if room.updated_at <= message.created_at {
                    room.updated_at = message.created_at;
                    room.last_message = Some(Box::new(message.clone()));
                }
                self.inner.store.upsert_room(room);
            }
            None => {
                debug!(room = %room_id, "message for unknown room, room list flagged for resync");
                self.state().room_list.needs_resync = true;
            }
        }

        if !inserted {
            debug!(room = %room_id, message = %message.id, "duplicate message absorbed");
            return;
        }

        if eager_read {
            self.emit_if_connected(OutboundEvent::MessageRead {
                message_id: message.id.clone(),
                room_id: room_id.clone(),
            })
            .await;
        } else if message.is_unread_for(&user) {
            self.inner.store.apply_unread_delta(&room_id, 1);
        }
    }

    /// Keep a live message for a room whose timeline is not in memory. A
    /// cached timeline gets the message so the next cache-tier load shows it.
    /// Returns `false` when the message was seen before.
    fn record_unloaded(&self, room_id: &RoomId, message: &Message) -> bool {
        let first_delivery =
            self.with_session(room_id, |s| s.counted_unloaded.insert(message.id.clone()));
        if !self.inner.cache.has_messages(room_id) {
            return first_delivery;
        }
        let newly_cached = self.inner.cache.insert_message(room_id, message);
        first_delivery && newly_cached
    }

    fn on_message_read(&self, message_id: &MessageId, reader: &UserId, room_hint: Option<&RoomId>) {
        let Some((room_id, mut message)) = self.inner.store.find_message(message_id) else {
            let Some(room_id) = self.mark_cached_read(message_id, reader) else {
                debug!(message = %message_id, room = ?room_hint, "read receipt for unknown message");
                return;
            };
            debug!(message = %message_id, room = %room_id, "read receipt for cached message credited");
            self.inner.store.apply_unread_delta(&room_id, -1);
            return;
        };

        if !message.mark_read_by(reader) {
            return;
        }

        self.inner.store.upsert_message(&room_id, message.clone());
        self.inner
            .cache
            .update_message(&message.id, &MessagePatch::read_state(&message));

        let user = &self.inner.current_user;
        if reader == user && !message.is_from(user) {
            self.inner.store.apply_unread_delta(&room_id, -1);
        }
    }

    /// Apply a receipt to the cached copy of a message the store does not
    /// hold. Returns the message's room when the receipt newly credits the
    /// current user with reading someone else's message.
    fn mark_cached_read(&self, message_id: &MessageId, reader: &UserId) -> Option<RoomId> {
        let mut cached = self.inner.cache.get_message(message_id)?;
        if !cached.mark_read_by(reader) {
            return None;
        }
        self.inner
            .cache
            .update_message(message_id, &MessagePatch::read_state(&cached));

        let user = &self.inner.current_user;
        (reader == user && !cached.is_from(user)).then_some(cached.room_id)
    }

    fn on_messages_marked_as_read(&self, room_id: &RoomId, message_ids: &[MessageId], reader: &UserId) {
        let wanted: HashSet<&MessageId> = message_ids.iter().collect();
        let mut messages = self.inner.store.messages(room_id);

        let mut known = HashSet::new();
        let mut credited = 0i64;
        let mut patches = Vec::new();
        for message in messages.iter_mut().filter(|m| wanted.contains(&m.id)) {
            known.insert(message.id.clone());
            if message.mark_read_by(reader) {
                if !message.is_from(reader) {
                    credited += 1;
                }
                patches.push((message.id.clone(), MessagePatch::read_state(message)));
            }
        }

        if !patches.is_empty() {
            self.inner.store.set_messages(room_id, messages);
            for (message_id, patch) in &patches {
                self.inner.cache.update_message(message_id, patch);
            }
        }

        let user = &self.inner.current_user;
        let mut unknown = 0i64;
        for message_id in wanted.into_iter().filter(|id| !known.contains(*id)) {
            if self.inner.cache.get_message(message_id).is_some() {
                if self.mark_cached_read(message_id, reader).is_some() {
                    unknown += 1;
                }
            } else if reader == user
                && self.with_session(room_id, |s| s.credited_unloaded.insert(message_id.clone()))
            {
                // Never seen locally: unread as far as the counter knows.
                unknown += 1;
            }
        }

        if reader != user {
            return;
        }

        let delta = credited + unknown;
        if delta > 0 {
            self.inner.store.apply_unread_delta(room_id, -delta);
        }
        debug!(room = %room_id, credited, unknown, "bulk read applied");
    }

    async fn on_reconnected(&self) {
        let active = {
            let mut state = self.state();
            for session in state.sessions.values_mut() {
                session.needs_resync = true;
            }
            state.room_list.needs_resync = true;
            state.active_room.clone()
        };
        info!("real-time channel reconnected, rooms flagged for resync");

        if let Some(room_id) = active {
            self.emit_if_connected(OutboundEvent::JoinRoom { room_id }).await;
        }
    }
}
