//! Per-key single-flight guard.
//!
//! A caller that finds its key already in flight is dropped instead of
//! waiting; the key is released when the winning caller's guard goes out of
//! scope, including on early return or panic.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct SingleFlight<K: Eq + Hash + Clone> {
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` when another caller holds it.
    pub fn try_begin(&self, key: K) -> Option<FlightGuard<K>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct FlightGuard<K: Eq + Hash + Clone> {
    key: K,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_caller_is_dropped_until_release() {
        let flights = SingleFlight::new();

        let guard = flights.try_begin("room-1").expect("first caller wins");
        assert!(flights.try_begin("room-1").is_none());
        assert!(flights.try_begin("room-2").is_some());
        assert!(flights.is_in_flight(&"room-1"));

        drop(guard);
        assert!(!flights.is_in_flight(&"room-1"));
        assert!(flights.try_begin("room-1").is_some());
    }
}
