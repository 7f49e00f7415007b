//! Scroll-back pagination: remote pages first, then archive days.

use tracing::{debug, warn};

use convoy_shared::RoomId;

use super::{Flight, SyncEngine};
use crate::archive::ArchiveState;
use crate::remote::PageRequest;
use crate::session::RoomView;

/// Outcome of making sure a room's archive day list is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaysStatus {
    Ready,
    /// Another caller is fetching the list; the request was queued.
    Queued,
    /// Fetched by this call and a request was queued meanwhile.
    ReadyWithPending,
    Failed,
}

impl SyncEngine {
    /// Load the next slice of older history. Concurrent calls for the same
    /// room return immediately with the current view.
    pub async fn load_more_messages(&self, room_id: &RoomId) -> RoomView {
        let Some(_flight) = self
            .inner
            .flights
            .try_begin((room_id.clone(), Flight::OlderMessages))
        else {
            debug!(room = %room_id, "older messages already loading");
            return self.room_view(room_id);
        };

        let (has_more, remote_exhausted, page, page_size) = self.with_session(room_id, |s| {
            (s.has_more_messages, s.remote_exhausted, s.current_page, s.page_size)
        });
        if !has_more {
            return self.room_view(room_id);
        }

        self.with_session(room_id, |s| s.is_loading_older_messages = true);

        if remote_exhausted {
            self.load_next_archive_day(room_id).await;
        } else {
            let next = page + 1;
            let result = self
                .inner
                .remote
                .fetch_messages(room_id, &PageRequest::new(next, page_size))
                .await;

            match result {
                Ok(fetched) => {
                    let has_more = fetched.pagination.has_more;
                    let added = self.merge_into_timeline(room_id, fetched.messages);
                    debug!(room = %room_id, page = next, added, has_more, "older page merged");
                    self.with_session(room_id, |s| {
                        s.current_page = s.current_page.max(next);
                        s.remote_exhausted = !has_more;
                    });

                    // Remote just ran out: go straight to the archive.
                    if !has_more {
                        self.load_next_archive_day(room_id).await;
                    }
                }
                Err(e) => warn!(room = %room_id, page = next, error = %e, "failed to load older messages"),
            }
        }

        self.with_session(room_id, |s| s.is_loading_older_messages = false);
        self.room_view(room_id)
    }

    /// Fetch the archive day list ahead of the first scroll-back that needs
    /// it. A pagination request that arrived meanwhile is replayed.
    pub async fn prefetch_archive_days(&self, room_id: &RoomId) {
        if self.ensure_archive_days(room_id).await == DaysStatus::ReadyWithPending {
            debug!(room = %room_id, "replaying queued pagination request");
            self.load_more_messages(room_id).await;
        }
    }

    async fn ensure_archive_days(&self, room_id: &RoomId) -> DaysStatus {
        let began = self.with_session(room_id, |s| match s.archive.state() {
            ArchiveState::DaysReady => Some(DaysStatus::Ready),
            ArchiveState::LoadingDays => {
                s.archive.queue_pending();
                Some(DaysStatus::Queued)
            }
            ArchiveState::NotLoaded => {
                s.archive.begin_loading();
                None
            }
        });
        if let Some(status) = began {
            return status;
        }

        let joined_at = self
            .inner
            .store
            .room(room_id)
            .and_then(|room| room.joined_at(&self.inner.current_user));

        let result = self.inner.remote.fetch_archive_days(room_id).await;
        match result {
            Ok(days) => {
                let pending = self.with_session(room_id, |s| {
                    let pending = s.archive.finish_loading(days, joined_at);
                    s.refresh_has_more();
                    pending
                });
                if pending {
                    DaysStatus::ReadyWithPending
                } else {
                    DaysStatus::Ready
                }
            }
            Err(e) => {
                warn!(room = %room_id, error = %e, "failed to load archive days");
                self.with_session(room_id, |s| s.archive.fail_loading());
                DaysStatus::Failed
            }
        }
    }

    /// Merge the oldest archive day not shown yet. The cursor only moves
    /// once the day was merged.
    async fn load_next_archive_day(&self, room_id: &RoomId) {
        match self.ensure_archive_days(room_id).await {
            DaysStatus::Ready | DaysStatus::ReadyWithPending => {}
            DaysStatus::Queued | DaysStatus::Failed => return,
        }

        let Some((day, cached)) = self.with_session(room_id, |s| {
            s.archive.next_day().cloned().map(|day| {
                let cached = s.archive.cached_day(&day.date_key());
                (day, cached)
            })
        }) else {
            self.with_session(room_id, |s| s.refresh_has_more());
            debug!(room = %room_id, "archive exhausted");
            return;
        };

        let key = day.date_key();
        let messages = match cached {
            Some(messages) => messages,
            None => {
                let result = self
                    .inner
                    .remote
                    .fetch_archive_day(room_id, day.year, day.month, day.day)
                    .await;
                match result {
                    Ok(fetched) => {
                        self.with_session(room_id, |s| {
                            s.archive.cache_day(key.clone(), fetched.messages.clone())
                        });
                        fetched.messages
                    }
                    Err(e) => {
                        warn!(room = %room_id, day = %key, error = %e, "failed to load archive day");
                        return;
                    }
                }
            }
        };

        let added = self.merge_into_timeline(room_id, messages);
        self.with_session(room_id, |s| {
            s.archive.advance();
            s.refresh_has_more();
        });
        debug!(room = %room_id, day = %key, added, "archive day merged");
    }
}
