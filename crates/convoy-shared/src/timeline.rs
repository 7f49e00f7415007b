//! Helpers that keep a room timeline sorted, de-duplicated and consistent
//! with its unread counter.

use std::collections::HashMap;

use crate::models::Message;
use crate::types::{MessageId, UserId};

/// Sort ascending by server timestamp. Ties are broken by id so the order is
/// stable across merges.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Collapse duplicate ids into one instance (keeping the union of readers)
/// and sort the result.
pub fn normalize(messages: Vec<Message>) -> Vec<Message> {
    merge(Vec::new(), messages)
}

/// Merge `incoming` into `existing`. Messages already present keep their
/// position in the id space and absorb the incoming read state.
pub fn merge(existing: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    let mut index: HashMap<MessageId, usize> = HashMap::with_capacity(existing.len());
    let mut out: Vec<Message> = Vec::with_capacity(existing.len() + incoming.len());

    for message in existing.into_iter().chain(incoming) {
        match index.get(&message.id) {
            Some(&pos) => out[pos].absorb(&message),
            None => {
                index.insert(message.id.clone(), out.len());
                out.push(message);
            }
        }
    }

    sort_messages(&mut out);
    out
}

/// Number of incoming messages whose id is not in `existing`.
pub fn count_new(existing: &[Message], incoming: &[Message]) -> usize {
    let known: std::collections::HashSet<&MessageId> = existing.iter().map(|m| &m.id).collect();
    let mut seen = std::collections::HashSet::new();
    incoming
        .iter()
        .filter(|m| !known.contains(&m.id) && seen.insert(&m.id))
        .count()
}

/// Derived unread count: messages from others not yet read by `user`.
pub fn unread_count(messages: &[Message], user: &UserId) -> u32 {
    messages.iter().filter(|m| m.is_unread_for(user)).count() as u32
}
