#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use convoy_client::{
    DurableCache, PageRequest, RealtimeChannel, RemoteSource, Result, RoomStore, SyncConfig,
    SyncEngine, SyncError,
};
use convoy_shared::protocol::OutboundEvent;
use convoy_shared::{
    ArchiveDay, ArchiveDayMessages, ChatRoom, Message, MessageId, MessagePage, Pagination,
    Participant, RoomId, RoomKind, UserId, UserRef,
};

pub const ME: &str = "me";
pub const DISPATCH: &str = "dispatch";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
}

pub fn msg(room: &str, id: &str, sender: &str, minute: i64, read_by: &[&str]) -> Message {
    Message {
        id: MessageId::new(id),
        room_id: RoomId::new(room),
        sender: UserRef {
            id: UserId::new(sender),
            name: None,
            avatar: None,
        },
        content: Some(format!("message {id}")),
        file: None,
        is_read: !read_by.is_empty(),
        read_by: read_by.iter().map(|u| UserId::new(*u)).collect(),
        created_at: base_time() + ChronoDuration::minutes(minute),
        reply_to: None,
    }
}

/// `count` messages from dispatch, one per minute, ids `{room}-000`...
pub fn history(room: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| msg(room, &format!("{room}-{i:03}"), DISPATCH, i as i64, &[]))
        .collect()
}

pub fn room(id: &str, joined_at: DateTime<Utc>) -> ChatRoom {
    ChatRoom {
        id: RoomId::new(id),
        kind: RoomKind::Load,
        name: Some(format!("Load {id}")),
        avatar: None,
        participants: vec![
            Participant {
                user: UserRef {
                    id: UserId::new(ME),
                    name: Some("Driver".into()),
                    avatar: None,
                },
                joined_at,
                role: None,
            },
            Participant {
                user: UserRef {
                    id: UserId::new(DISPATCH),
                    name: Some("Dispatch".into()),
                    avatar: None,
                },
                joined_at,
                role: Some("dispatcher".into()),
            },
        ],
        is_muted: false,
        is_pinned: false,
        unread_count: 0,
        last_message: None,
        updated_at: base_time(),
    }
}

pub fn archive_day(room: &str, year: i32, month: u32, day: u32) -> ArchiveDay {
    ArchiveDay {
        room_id: RoomId::new(room),
        year,
        month,
        day,
        message_count: 2,
        created_at: base_time(),
    }
}

pub fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Fake remote
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRemote {
    rooms: Mutex<Vec<ChatRoom>>,
    history: Mutex<HashMap<RoomId, Vec<Message>>>,
    archive: Mutex<HashMap<RoomId, Vec<(ArchiveDay, Vec<Message>)>>>,
    message_delay: Mutex<Option<Duration>>,
    archive_days_delay: Mutex<Option<Duration>>,
    pub fail_messages: AtomicBool,
    pub fail_rooms: AtomicBool,
    pub room_list_calls: AtomicUsize,
    pub message_calls: AtomicUsize,
    pub archive_days_calls: AtomicUsize,
    pub archive_day_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn set_rooms(&self, rooms: Vec<ChatRoom>) {
        *self.rooms.lock().unwrap() = rooms;
    }

    /// Full history of a room, oldest first.
    pub fn set_history(&self, room: &str, messages: Vec<Message>) {
        self.history
            .lock()
            .unwrap()
            .insert(RoomId::new(room), messages);
    }

    pub fn add_archive_day(&self, day: ArchiveDay, messages: Vec<Message>) {
        self.archive
            .lock()
            .unwrap()
            .entry(day.room_id.clone())
            .or_default()
            .push((day, messages));
    }

    pub fn delay_messages(&self, delay: Duration) {
        *self.message_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_archive_days(&self, delay: Duration) {
        *self.archive_days_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn page(&self, room_id: &RoomId, request: &PageRequest) -> MessagePage {
        let all = self
            .history
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_default();
        let total = all.len();
        let limit = request.limit as usize;
        let page = request.page as usize;

        // page 1 is the newest slice
        let end = total.saturating_sub((page - 1) * limit);
        let start = total.saturating_sub(page * limit);
        MessagePage {
            messages: all[start..end].to_vec(),
            pagination: Pagination {
                page: request.page,
                limit: request.limit,
                total: total as u64,
                pages: total.div_ceil(limit) as u32,
                has_more: page * limit < total,
            },
        }
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_rooms(&self) -> Result<Vec<ChatRoom>> {
        self.room_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_rooms.load(Ordering::SeqCst) {
            return Err(SyncError::Http {
                status: 503,
                message: "HTTP 503".into(),
            });
        }
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<ChatRoom> {
        self.rooms
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == room_id)
            .cloned()
            .ok_or_else(|| SyncError::RoomNotFound(room_id.clone()))
    }

    async fn fetch_messages(&self, room_id: &RoomId, request: &PageRequest) -> Result<MessagePage> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.message_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(SyncError::Http {
                status: 500,
                message: "HTTP 500".into(),
            });
        }
        Ok(self.page(room_id, request))
    }

    async fn fetch_file_messages(
        &self,
        room_id: &RoomId,
        request: &PageRequest,
    ) -> Result<MessagePage> {
        let mut page = self.page(room_id, request);
        page.messages.retain(|m| m.file.is_some());
        Ok(page)
    }

    async fn fetch_archive_days(&self, room_id: &RoomId) -> Result<Vec<ArchiveDay>> {
        self.archive_days_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.archive_days_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .archive
            .lock()
            .unwrap()
            .get(room_id)
            .map(|days| days.iter().map(|(d, _)| d.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_archive_day(
        &self,
        room_id: &RoomId,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<ArchiveDayMessages> {
        self.archive_day_calls.fetch_add(1, Ordering::SeqCst);
        let archive = self.archive.lock().unwrap();
        let (found, messages) = archive
            .get(room_id)
            .and_then(|days| {
                days.iter()
                    .find(|(d, _)| d.year == year && d.month == month && d.day == day)
            })
            .cloned()
            .ok_or_else(|| SyncError::Http {
                status: 404,
                message: "Archive day not found".into(),
            })?;
        Ok(ArchiveDayMessages {
            total_count: messages.len() as u32,
            messages,
            year: found.year,
            month: found.month,
            created_at: found.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Fake channel
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeChannel {
    connected: AtomicBool,
    sent: Mutex<Vec<OutboundEvent>>,
}

impl FakeChannel {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.sent.lock().unwrap().push(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: SyncEngine,
    pub remote: Arc<FakeRemote>,
    pub channel: Arc<FakeChannel>,
    pub store: Arc<RoomStore>,
    pub cache: Arc<DurableCache>,
}

impl Harness {
    pub fn new(connected: bool) -> Self {
        Self::with_config(connected, SyncConfig::default())
    }

    pub fn with_config(connected: bool, config: SyncConfig) -> Self {
        let remote = Arc::new(FakeRemote::default());
        let channel = Arc::new(FakeChannel::default());
        channel.set_connected(connected);
        let store = Arc::new(RoomStore::default());
        let cache = Arc::new(DurableCache::in_memory());

        let engine = SyncEngine::new(
            UserId::new(ME),
            config,
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&remote) as Arc<dyn RemoteSource>,
            Arc::clone(&channel) as Arc<dyn RealtimeChannel>,
        );

        Self {
            engine,
            remote,
            channel,
            store,
            cache,
        }
    }

    pub fn unread(&self, room: &str) -> u32 {
        self.store
            .room(&RoomId::new(room))
            .map(|r| r.unread_count)
            .unwrap_or_default()
    }
}

pub fn assert_sorted_unique(messages: &[Message]) {
    for pair in messages.windows(2) {
        assert!(
            (pair[0].created_at, &pair[0].id) < (pair[1].created_at, &pair[1].id),
            "timeline out of order or duplicated at {} / {}",
            pair[0].id,
            pair[1].id
        );
    }
}
