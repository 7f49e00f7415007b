//! Room list loading and membership changes.

use tracing::{debug, warn};

use convoy_shared::constants::ERR_LOAD_ROOMS;
use convoy_shared::protocol::OutboundEvent;
use convoy_shared::timeline;
use convoy_shared::{ChatRoom, RoomId};

use super::SyncEngine;
use crate::session::RoomListView;

impl SyncEngine {
    /// Serve the cached room list when it is fresh, otherwise fetch it.
    pub async fn load_chat_rooms(&self) -> RoomListView {
        let needs_resync = self.state().room_list.needs_resync;
        let max_age = self.inner.config.room_cache_max_age_minutes;

        if !needs_resync && self.inner.cache.is_cache_fresh(max_age) {
            let cached = self.inner.cache.get_rooms();
            if !cached.is_empty() {
                debug!(count = cached.len(), "room list served from cache");
                self.install_rooms(cached);
                return self.room_list_view();
            }
        }

        self.fetch_chat_rooms().await
    }

    /// Always go to the remote.
    pub async fn refresh_chat_rooms(&self) -> RoomListView {
        self.fetch_chat_rooms().await
    }

    async fn fetch_chat_rooms(&self) -> RoomListView {
        {
            let mut state = self.state();
            state.room_list.is_loading = true;
            state.room_list.error = None;
        }

        let result = self.inner.remote.fetch_rooms().await;
        let error = match result {
            Ok(rooms) => {
                debug!(count = rooms.len(), "room list fetched");
                let rooms = self.install_rooms(rooms);
                self.inner.cache.save_rooms(&rooms);
                self.state().room_list.needs_resync = false;
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to load chat rooms");
                let cached = self.inner.cache.get_rooms();
                if !cached.is_empty() {
                    self.install_rooms(cached);
                    None
                } else if self.inner.store.rooms().is_empty() {
                    Some(ERR_LOAD_ROOMS.to_string())
                } else {
                    None
                }
            }
        };

        {
            let mut state = self.state();
            state.room_list.is_loading = false;
            state.room_list.error = error;
        }
        self.room_list_view()
    }

    /// Replace the store's room list, deriving unread counts for rooms whose
    /// timeline is in memory.
    fn install_rooms(&self, rooms: Vec<ChatRoom>) -> Vec<ChatRoom> {
        let rooms: Vec<ChatRoom> = rooms.into_iter().map(|r| self.with_derived_unread(r)).collect();
        self.inner.store.replace_rooms(rooms.clone());
        rooms
    }

    fn with_derived_unread(&self, mut room: ChatRoom) -> ChatRoom {
        if self.inner.store.has_messages(&room.id) {
            let messages = self.inner.store.messages(&room.id);
            room.unread_count = timeline::unread_count(&messages, &self.inner.current_user);
        }
        room
    }

    pub fn add_chat_room(&self, room: ChatRoom) -> RoomListView {
        let room = self.with_derived_unread(room);
        debug!(room = %room.id, "chat room added");
        self.inner.store.upsert_room(room);
        self.inner.cache.save_rooms(&self.inner.store.rooms());
        self.room_list_view()
    }

    /// Forget a deleted or left room everywhere.
    pub async fn remove_chat_room(&self, room_id: &RoomId) -> RoomListView {
        let was_active = {
            let mut state = self.state();
            state.sessions.remove(room_id);
            let was_active = state.active_room.as_ref() == Some(room_id);
            if was_active {
                state.active_room = None;
            }
            was_active
        };

        self.inner.store.remove_room(room_id);
        self.inner.cache.clear_messages(room_id);
        self.inner.cache.save_rooms(&self.inner.store.rooms());

        if was_active {
            self.emit_if_connected(OutboundEvent::LeaveRoom {
                room_id: room_id.clone(),
            })
            .await;
        }
        debug!(room = %room_id, "chat room removed");
        self.room_list_view()
    }

    pub fn room_list_view(&self) -> RoomListView {
        let chat_rooms = self.inner.store.rooms();
        let state = self.state();
        RoomListView {
            chat_rooms,
            is_loading: state.room_list.is_loading,
            error: state.room_list.error.clone(),
        }
    }
}
