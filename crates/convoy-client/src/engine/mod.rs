//! Synchronization engine.
//!
//! [`SyncEngine`] reconciles the in-memory [`RoomStore`], the durable cache,
//! the remote paginated source, the archive and the real-time channel into
//! one view per room. It is a cheap clonable handle; all clones share state.
//!
//! Internal state sits behind a `std::sync::Mutex` that is only ever locked
//! between suspension points, never across an `.await`.

mod events;
mod pagination;
mod rooms;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use convoy_shared::constants::{ERR_LOAD_MESSAGES, ERR_LOAD_ROOM};
use convoy_shared::protocol::{InboundEvent, OutboundEvent};
use convoy_shared::timeline;
use convoy_shared::{FileRef, Message, MessagePage, MessagePatch, ReplyRef, RoomId, UserId};

use crate::cache::DurableCache;
use crate::channel::{RealtimeChannel, WsChannel};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::remote::{HttpRemote, PageRequest, RemoteSource};
use crate::retry::RetryPolicy;
use crate::room_store::RoomStore;
use crate::session::{LoadOutcome, LoadSource, RoomListState, RoomSession, RoomView};
use crate::single_flight::SingleFlight;

/// Operations guarded per room against concurrent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Flight {
    OlderMessages,
    Reconcile,
}

#[derive(Debug, Default)]
struct EngineState {
    sessions: HashMap<RoomId, RoomSession>,
    active_room: Option<RoomId>,
    presence: HashMap<UserId, bool>,
    room_list: RoomListState,
}

struct EngineInner {
    current_user: UserId,
    config: SyncConfig,
    store: Arc<RoomStore>,
    cache: Arc<DurableCache>,
    remote: Arc<dyn RemoteSource>,
    channel: Arc<dyn RealtimeChannel>,
    state: Mutex<EngineState>,
    flights: SingleFlight<(RoomId, Flight)>,
}

#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        current_user: UserId,
        config: SyncConfig,
        store: Arc<RoomStore>,
        cache: Arc<DurableCache>,
        remote: Arc<dyn RemoteSource>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                current_user,
                config,
                store,
                cache,
                remote,
                channel,
                state: Mutex::new(EngineState::default()),
                flights: SingleFlight::new(),
            }),
        }
    }

    /// Wire the production stack: REST remote, WebSocket channel and the
    /// on-disk cache. The returned receiver must be handed to
    /// [`SyncEngine::run`].
    pub fn connect(
        config: SyncConfig,
        current_user: UserId,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<InboundEvent>)> {
        let remote = HttpRemote::new(config.api_url.clone(), token)?;
        let retry = RetryPolicy::new(config.reconnect_base_delay_ms, config.reconnect_max_delay_ms);
        let (channel, events) = WsChannel::spawn(&config.socket_url, token, retry)?;
        let cache = DurableCache::open(config.cache_path.as_deref());

        info!(user = %current_user, api = %config.api_url, "sync engine starting");
        let engine = Self::new(
            current_user,
            config,
            Arc::new(RoomStore::default()),
            Arc::new(cache),
            Arc::new(remote),
            Arc::new(channel),
        );
        Ok((engine, events))
    }

    pub fn current_user(&self) -> &UserId {
        &self.inner.current_user
    }

    pub fn store(&self) -> &Arc<RoomStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<DurableCache> {
        &self.inner.cache
    }

    pub fn is_connected(&self) -> bool {
        self.inner.channel.is_connected()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_session<R>(&self, room_id: &RoomId, f: impl FnOnce(&mut RoomSession) -> R) -> R {
        let page_size = self.inner.config.page_size;
        let mut state = self.state();
        let session = state
            .sessions
            .entry(room_id.clone())
            .or_insert_with(|| RoomSession::new(page_size));
        f(session)
    }

    /// Set the room's unread counter to the value derived from `messages`.
    fn recompute_unread(&self, room_id: &RoomId, messages: &[Message]) -> u32 {
        let unread = timeline::unread_count(messages, &self.inner.current_user);
        self.inner.store.set_unread_absolute(room_id, unread);
        unread
    }

    /// Merge `incoming` into the stored timeline, then write the result back
    /// to the store and the cache. Returns the number of ids that were new.
    fn merge_into_timeline(&self, room_id: &RoomId, incoming: Vec<Message>) -> usize {
        let existing = self.inner.store.messages(room_id);
        let added = timeline::count_new(&existing, &incoming);
        let merged = timeline::merge(existing, incoming);

        self.inner.store.set_messages(room_id, merged.clone());
        self.inner.cache.save_messages(room_id, &merged);
        self.recompute_unread(room_id, &merged);
        added
    }

    /// Emit an event if the channel is up. Failures are logged.
    async fn emit_if_connected(&self, event: OutboundEvent) {
        if !self.inner.channel.is_connected() {
            debug!(?event, "channel down, event not sent");
            return;
        }
        if let Err(e) = self.inner.channel.emit(event).await {
            warn!(error = %e, "failed to emit event");
        }
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn room_view(&self, room_id: &RoomId) -> RoomView {
        let chat_room = self.inner.store.room(room_id);
        let messages = self.inner.store.messages(room_id);
        let page_size = self.inner.config.page_size;

        let mut state = self.state();
        let session = state
            .sessions
            .entry(room_id.clone())
            .or_insert_with(|| RoomSession::new(page_size));

        RoomView {
            chat_room,
            messages,
            is_loading_chat_room: session.is_loading_chat_room,
            is_loading_messages: session.is_loading_messages,
            is_loading_older_messages: session.is_loading_older_messages,
            error: session.error.clone(),
            has_more_messages: session.has_more_messages,
            current_page: session.current_page,
            is_sending_message: session.is_sending_message,
        }
    }

    pub fn active_room(&self) -> Option<RoomId> {
        self.state().active_room.clone()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.state().presence.get(user_id).copied().unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Fetch room metadata. Failures end up in the view's `error`.
    pub async fn load_room(&self, room_id: &RoomId) -> RoomView {
        self.with_session(room_id, |s| {
            s.is_loading_chat_room = true;
            s.error = None;
        });

        let result = self.inner.remote.fetch_room(room_id).await;
        match result {
            Ok(mut room) => {
                if self.inner.store.has_messages(room_id) {
                    let messages = self.inner.store.messages(room_id);
                    room.unread_count = timeline::unread_count(&messages, &self.inner.current_user);
                }
                self.inner.store.upsert_room(room);
                self.with_session(room_id, |s| s.is_loading_chat_room = false);
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "failed to load chat room");
                self.with_session(room_id, |s| {
                    s.is_loading_chat_room = false;
                    s.error = Some(ERR_LOAD_ROOM.to_string());
                });
            }
        }
        self.room_view(room_id)
    }

    /// Resolve a room's messages. Page 1 goes through the store, the cache
    /// and then the remote; later pages are fetched from the remote directly.
    pub async fn load_messages(
        &self,
        room_id: &RoomId,
        page: u32,
        page_size: Option<u32>,
    ) -> LoadOutcome {
        let page = page.max(1);
        let page_size = self.with_session(room_id, |s| {
            if let Some(size) = page_size {
                s.page_size = size.max(1);
            }
            s.is_loading_messages = true;
            s.error = None;
            s.page_size
        });

        if page > 1 {
            return self.load_remote_page(room_id, page, page_size).await;
        }

        if self.inner.store.has_messages(room_id) {
            let messages = self.inner.store.messages(room_id);
            self.recompute_unread(room_id, &messages);
            debug!(room = %room_id, count = messages.len(), "messages served from store");
            return self.finish_local_load(room_id, LoadSource::Store);
        }

        let cached = self.inner.cache.get_messages(room_id, page_size, 0);
        if !cached.is_empty() {
            debug!(room = %room_id, count = cached.len(), "messages served from cache");
            self.inner.store.set_messages(room_id, cached);
            let messages = self.inner.store.messages(room_id);
            self.recompute_unread(room_id, &messages);
            return self.finish_local_load(room_id, LoadSource::Cache);
        }

        self.load_remote_page(room_id, 1, page_size).await
    }

    fn finish_local_load(&self, room_id: &RoomId, source: LoadSource) -> LoadOutcome {
        let needs_resync = self.with_session(room_id, |s| {
            s.is_loading_messages = false;
            if s.current_page == 0 {
                s.current_page = 1;
            }
            s.needs_resync
        });

        let reconcile = if needs_resync || !self.inner.channel.is_connected() {
            Some(self.spawn_reconcile(room_id))
        } else {
            None
        };

        LoadOutcome {
            view: self.room_view(room_id),
            source,
            reconcile,
        }
    }

    async fn load_remote_page(&self, room_id: &RoomId, page: u32, page_size: u32) -> LoadOutcome {
        let request = PageRequest::new(page, page_size);
        let result = self.inner.remote.fetch_messages(room_id, &request).await;

        let source = match result {
            Ok(fetched) => {
                let has_more = fetched.pagination.has_more;
                let added = self.merge_into_timeline(room_id, fetched.messages);
                debug!(room = %room_id, page, added, has_more, "remote page merged");
                self.with_session(room_id, |s| {
                    s.current_page = s.current_page.max(page);
                    s.remote_exhausted = !has_more;
                    s.needs_resync = false;
                    s.refresh_has_more();
                });
                LoadSource::Remote
            }
            Err(e) => {
                warn!(room = %room_id, page, error = %e, "failed to load messages");
                if self.inner.store.has_messages(room_id) {
                    LoadSource::Store
                } else {
                    self.with_session(room_id, |s| s.error = Some(ERR_LOAD_MESSAGES.to_string()));
                    LoadSource::None
                }
            }
        };

        self.with_session(room_id, |s| s.is_loading_messages = false);
        LoadOutcome {
            view: self.room_view(room_id),
            source,
            reconcile: None,
        }
    }

    fn spawn_reconcile(&self, room_id: &RoomId) -> JoinHandle<()> {
        let engine = self.clone();
        let room_id = room_id.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.reconcile_room(&room_id).await {
                warn!(room = %room_id, error = %e, "background reconcile failed");
            }
        })
    }

    /// Merge remote page 1 into the stored timeline. Returns the number of
    /// messages that were missing locally. A reconcile already running for
    /// the room makes this a no-op.
    pub async fn reconcile_room(&self, room_id: &RoomId) -> Result<usize> {
        let Some(_flight) = self
            .inner
            .flights
            .try_begin((room_id.clone(), Flight::Reconcile))
        else {
            debug!(room = %room_id, "reconcile already in flight");
            return Ok(0);
        };

        let page_size = self.with_session(room_id, |s| s.page_size);
        let fetched = self
            .inner
            .remote
            .fetch_messages(room_id, &PageRequest::new(1, page_size))
            .await?;

        let has_more = fetched.pagination.has_more;
        let added = self.merge_into_timeline(room_id, fetched.messages);
        self.with_session(room_id, |s| {
            s.needs_resync = false;
            if s.current_page <= 1 {
                s.current_page = 1;
                s.remote_exhausted = !has_more;
                s.refresh_has_more();
            }
        });

        info!(room = %room_id, added, "room reconciled");
        Ok(added)
    }

    /// File-only listing. Not merged into the conversation timeline.
    pub async fn load_file_messages(
        &self,
        room_id: &RoomId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage> {
        self.inner
            .remote
            .fetch_file_messages(room_id, &PageRequest::new(page, limit))
            .await
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Emit a message. Nothing is inserted locally; the channel echo adds it.
    pub async fn send_message(
        &self,
        room_id: &RoomId,
        content: Option<String>,
        file: Option<FileRef>,
        reply_to: Option<ReplyRef>,
    ) -> Result<()> {
        let content = content.filter(|c| !c.trim().is_empty());
        if content.is_none() && file.is_none() {
            return Err(SyncError::InvalidInput("message has neither content nor file".into()));
        }
        if !self.inner.channel.is_connected() {
            return Err(SyncError::NotConnected);
        }

        self.with_session(room_id, |s| s.is_sending_message = true);
        let result = self
            .inner
            .channel
            .emit(OutboundEvent::SendMessage {
                room_id: room_id.clone(),
                content,
                file_data: file,
                reply_to,
            })
            .await;
        self.with_session(room_id, |s| s.is_sending_message = false);

        if let Err(e) = &result {
            warn!(room = %room_id, error = %e, "failed to send message");
        }
        result
    }

    // ------------------------------------------------------------------
    // Active room
    // ------------------------------------------------------------------

    pub async fn open_room(&self, room_id: &RoomId) {
        let previous = self.state().active_room.replace(room_id.clone());
        if let Some(previous) = previous.filter(|p| p != room_id) {
            self.emit_if_connected(OutboundEvent::LeaveRoom { room_id: previous })
                .await;
        }
        self.emit_if_connected(OutboundEvent::JoinRoom {
            room_id: room_id.clone(),
        })
        .await;
    }

    pub async fn close_room(&self, room_id: &RoomId) {
        {
            let mut state = self.state();
            if state.active_room.as_ref() == Some(room_id) {
                state.active_room = None;
            }
        }
        self.emit_if_connected(OutboundEvent::LeaveRoom {
            room_id: room_id.clone(),
        })
        .await;
    }

    /// Credit every unread message of the room to the current user. Returns
    /// how many messages were credited.
    pub async fn mark_room_read(&self, room_id: &RoomId) -> usize {
        let user = &self.inner.current_user;
        let mut messages = self.inner.store.messages(room_id);
        let mut changed = Vec::new();
        for message in messages.iter_mut().filter(|m| !m.is_from(user)) {
            if message.mark_read_by(user) {
                changed.push((message.id.clone(), MessagePatch::read_state(message)));
            }
        }

        if !changed.is_empty() {
            self.inner.store.set_messages(room_id, messages);
            for (message_id, patch) in &changed {
                self.inner.cache.update_message(message_id, patch);
            }
        }
        self.inner.store.set_unread_absolute(room_id, 0);

        self.emit_if_connected(OutboundEvent::MarkRoomRead {
            room_id: room_id.clone(),
        })
        .await;
        changed.len()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// App came back to the foreground: forget pagination cursors and
    /// resync every room and the room list on next load.
    pub fn reset_load_flags(&self) {
        let mut state = self.state();
        for session in state.sessions.values_mut() {
            session.reset_pagination();
            session.needs_resync = true;
        }
        state.room_list.needs_resync = true;
        debug!(rooms = state.sessions.len(), "load flags reset");
    }

    /// Purge the cache when it was written by another installation. The
    /// in-memory store is reset along with it.
    pub fn ensure_install(&self, install_id: &str) -> bool {
        let purged = self.inner.cache.ensure_install(install_id);
        if purged {
            self.inner.store.reset();
            self.state().sessions.clear();
        }
        purged
    }

    /// Drop all in-memory and cached data of the current user.
    pub fn logout(&self) {
        {
            let mut state = self.state();
            state.sessions.clear();
            state.presence.clear();
            state.active_room = None;
            state.room_list = RoomListState::default();
        }
        self.inner.store.reset();
        self.inner.cache.clear_all_messages();
        self.inner.cache.clear_rooms();
        info!(user = %self.inner.current_user, "logged out, local data cleared");
    }
}
