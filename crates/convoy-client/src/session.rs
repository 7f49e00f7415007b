//! Per-room and room-list state exposed to the UI layer.

use std::collections::HashSet;

use serde::Serialize;
use tokio::task::JoinHandle;

use convoy_shared::{ChatRoom, Message, MessageId};

use crate::archive::ArchiveController;

/// Transient pagination and loading state of one room.
#[derive(Debug)]
pub(crate) struct RoomSession {
    /// Last remote page merged into the timeline. `0` until the first load.
    pub current_page: u32,

    /// Page size used for remote requests of this room.
    pub page_size: u32,

    /// The remote source reported no further pages.
    pub remote_exhausted: bool,

    /// `false` once both the remote pages and the archive are used up.
    /// Stays `false` until [`SyncEngine::reset_load_flags`](crate::SyncEngine::reset_load_flags).
    pub has_more_messages: bool,

    pub is_loading_chat_room: bool,
    pub is_loading_messages: bool,
    pub is_loading_older_messages: bool,
    pub is_sending_message: bool,

    /// User-facing error of the last load, if any.
    pub error: Option<String>,

    /// Set on reconnect and on foreground; the next load reconciles with
    /// the remote even when the channel is up.
    pub needs_resync: bool,

    pub archive: ArchiveController,

    /// Live messages already counted while the timeline was not in memory.
    pub counted_unloaded: HashSet<MessageId>,

    /// Ids outside the store and the cache that a bulk read already
    /// credited to the current user.
    pub credited_unloaded: HashSet<MessageId>,
}

impl RoomSession {
    pub fn new(page_size: u32) -> Self {
        Self {
            current_page: 0,
            page_size: page_size.max(1),
            remote_exhausted: false,
            has_more_messages: true,
            is_loading_chat_room: false,
            is_loading_messages: false,
            is_loading_older_messages: false,
            is_sending_message: false,
            error: None,
            needs_resync: false,
            archive: ArchiveController::default(),
            counted_unloaded: HashSet::new(),
            credited_unloaded: HashSet::new(),
        }
    }

    /// Forget the pagination cursor and the archive walk.
    pub fn reset_pagination(&mut self) {
        self.current_page = 0;
        self.remote_exhausted = false;
        self.has_more_messages = true;
        self.is_loading_older_messages = false;
        self.archive = ArchiveController::default();
    }

    /// Re-evaluate the terminal state after a remote page or archive day.
    pub fn refresh_has_more(&mut self) {
        if self.remote_exhausted && self.archive.is_exhausted() {
            self.has_more_messages = false;
        }
    }
}

/// Snapshot of one room as rendered by a conversation screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub chat_room: Option<ChatRoom>,
    pub messages: Vec<Message>,
    pub is_loading_chat_room: bool,
    pub is_loading_messages: bool,
    pub is_loading_older_messages: bool,
    pub error: Option<String>,
    pub has_more_messages: bool,
    pub current_page: u32,
    pub is_sending_message: bool,
}

/// Snapshot of the room list screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListView {
    pub chat_rooms: Vec<ChatRoom>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct RoomListState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub needs_resync: bool,
}

/// Which tier answered a [`SyncEngine::load_messages`](crate::SyncEngine::load_messages) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Store,
    Cache,
    Remote,
    /// Every tier was empty or failing.
    None,
}

/// Result of a message load.
#[derive(Debug)]
pub struct LoadOutcome {
    pub view: RoomView,
    pub source: LoadSource,
    /// Background reconcile spawned because the channel was down or the room
    /// was flagged for resync.
    pub reconcile: Option<JoinHandle<()>>,
}
