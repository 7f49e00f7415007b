//! Per-room archive pagination state.
//!
//! `NotLoaded -> LoadingDays -> DaysReady`. Once the day list is ready, a
//! cursor walks it monotonically from the oldest available day. The
//! controller performs no I/O; the engine drives it around its fetches.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use convoy_shared::{ArchiveDay, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    NotLoaded,
    LoadingDays,
    DaysReady,
}

#[derive(Debug)]
pub struct ArchiveController {
    state: ArchiveState,
    /// Filtered day list, newest first.
    days: Vec<ArchiveDay>,
    consumed: usize,
    pending: bool,
    day_cache: HashMap<String, Vec<Message>>,
}

impl Default for ArchiveController {
    fn default() -> Self {
        Self {
            state: ArchiveState::NotLoaded,
            days: Vec::new(),
            consumed: 0,
            pending: false,
            day_cache: HashMap::new(),
        }
    }
}

impl ArchiveController {
    pub fn state(&self) -> ArchiveState {
        self.state
    }

    pub fn days(&self) -> &[ArchiveDay] {
        &self.days
    }

    /// Move to `LoadingDays`. Returns `false` if the list is already loading
    /// or loaded, in which case the caller must not fetch it again.
    pub fn begin_loading(&mut self) -> bool {
        if self.state != ArchiveState::NotLoaded {
            return false;
        }
        self.state = ArchiveState::LoadingDays;
        true
    }

    /// Record that a page request arrived while the day list was loading.
    pub fn queue_pending(&mut self) {
        if self.state == ArchiveState::LoadingDays {
            self.pending = true;
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Install the fetched day list. Days before `joined_at` are dropped.
    /// Returns whether a page request was queued meanwhile (and clears it).
    pub fn finish_loading(
        &mut self,
        mut days: Vec<ArchiveDay>,
        joined_at: Option<DateTime<Utc>>,
    ) -> bool {
        let join_date = joined_at.map(|t| t.date_naive());
        days.retain(|d| match (d.date(), join_date) {
            (None, _) => false,
            (Some(date), Some(joined)) => date >= joined,
            (Some(_), None) => true,
        });
        days.sort_by(|a, b| b.date().cmp(&a.date()));
        days.dedup_by(|a, b| a.date_key() == b.date_key());

        tracing::debug!(count = days.len(), "archive days ready");
        self.days = days;
        self.consumed = 0;
        self.state = ArchiveState::DaysReady;
        std::mem::take(&mut self.pending)
    }

    /// The day list could not be fetched; a later request may retry.
    pub fn fail_loading(&mut self) -> bool {
        self.state = ArchiveState::NotLoaded;
        std::mem::take(&mut self.pending)
    }

    /// Oldest day not consumed yet.
    pub fn next_day(&self) -> Option<&ArchiveDay> {
        if self.state != ArchiveState::DaysReady {
            return None;
        }
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        self.days.get(remaining - 1)
    }

    /// Mark the current day as merged.
    pub fn advance(&mut self) {
        if self.consumed < self.days.len() {
            self.consumed += 1;
        }
    }

    pub fn remaining(&self) -> usize {
        self.days.len() - self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == ArchiveState::DaysReady && self.remaining() == 0
    }

    pub fn cached_day(&self, date_key: &str) -> Option<Vec<Message>> {
        self.day_cache.get(date_key).cloned()
    }

    pub fn cache_day(&mut self, date_key: String, messages: Vec<Message>) {
        self.day_cache.insert(date_key, messages);
    }
}
