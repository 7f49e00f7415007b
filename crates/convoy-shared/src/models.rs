//! Domain model structs exchanged with the backend and persisted in the
//! on-device cache.
//!
//! Field names follow the backend's camelCase JSON so the same structs can be
//! decoded from REST responses, socket frames and cache rows.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, RoomId, UserId};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Minimal user reference embedded in rooms and messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat room
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    Direct,
    Group,
    Load,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user: UserRef,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A conversation container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    pub kind: RoomKind,
    /// Null for direct rooms; see [`ChatRoom::display_name`].
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_pinned: bool,
    /// Derived. Recomputed by the client whenever the timeline is known.
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<Box<Message>>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// Name shown in room lists. Direct rooms are named after the other
    /// participant.
    pub fn display_name(&self, current_user: &UserId) -> Option<String> {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return Some(name.clone());
        }
        if self.kind == RoomKind::Direct {
            return self
                .participants
                .iter()
                .find(|p| &p.user.id != current_user)
                .and_then(|p| p.user.name.clone());
        }
        None
    }

    /// When the given user joined this room, if they are a participant.
    pub fn joined_at(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.participants
            .iter()
            .find(|p| &p.user.id == user)
            .map(|p| p.joined_at)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    pub name: String,
    pub size: u64,
}

/// Snapshot of the replied-to message, captured when the reply was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub sender_name: String,
    pub excerpt: String,
    pub created_at: DateTime<Utc>,
}

/// A single chat message. Immutable apart from its read state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: UserRef,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file: Option<FileRef>,
    /// Read by at least one participant, whatever the room kind.
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_by: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
}

impl Message {
    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender.id == user
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.contains(user)
    }

    /// Whether this message counts towards `user`'s unread total.
    pub fn is_unread_for(&self, user: &UserId) -> bool {
        !self.is_from(user) && !self.is_read_by(user)
    }

    /// Record a reader. Returns `true` when the reader was not known yet.
    pub fn mark_read_by(&mut self, user: &UserId) -> bool {
        let added = self.read_by.insert(user.clone());
        if !self.read_by.is_empty() {
            self.is_read = true;
        }
        added
    }

    /// Fold another copy of the same message into this one, keeping the most
    /// complete read state.
    pub fn absorb(&mut self, other: &Message) {
        self.read_by.extend(other.read_by.iter().cloned());
        self.is_read = self.is_read || other.is_read || !self.read_by.is_empty();
    }
}

/// Patch applied to a cached message when only its read state changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    pub is_read: Option<bool>,
    pub read_by: Option<BTreeSet<UserId>>,
}

impl MessagePatch {
    pub fn read_state(message: &Message) -> Self {
        Self {
            is_read: Some(message.is_read),
            read_by: Some(message.read_by.clone()),
        }
    }

    pub fn apply(&self, message: &mut Message) {
        if let Some(is_read) = self.is_read {
            message.is_read = is_read;
        }
        if let Some(read_by) = &self.read_by {
            // readBy never shrinks
            message.read_by.extend(read_by.iter().cloned());
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
    pub has_more: bool,
}

/// One page of the remote message listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Pointer to a retrievable historical bucket of messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDay {
    pub room_id: RoomId,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ArchiveDay {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// `YYYY-MM-DD`, used to cache fetched days.
    pub fn date_key(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Contents of one archive day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDayMessages {
    pub messages: Vec<Message>,
    pub year: i32,
    pub month: u32,
    pub total_count: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(id: &str, name: &str) -> UserRef {
        UserRef {
            id: UserId::new(id),
            name: Some(name.into()),
            avatar: None,
        }
    }

    fn room(kind: RoomKind, name: Option<&str>) -> ChatRoom {
        let joined = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ChatRoom {
            id: RoomId::new("r1"),
            kind,
            name: name.map(String::from),
            avatar: None,
            participants: vec![
                Participant {
                    user: user("me", "Me"),
                    joined_at: joined,
                    role: None,
                },
                Participant {
                    user: user("dispatch", "Dispatch Desk"),
                    joined_at: joined,
                    role: Some("admin".into()),
                },
            ],
            is_muted: false,
            is_pinned: false,
            unread_count: 0,
            last_message: None,
            updated_at: joined,
        }
    }

    #[test]
    fn direct_room_is_named_after_other_participant() {
        let me = UserId::new("me");
        assert_eq!(
            room(RoomKind::Direct, None).display_name(&me).as_deref(),
            Some("Dispatch Desk")
        );
        assert_eq!(
            room(RoomKind::Load, Some("Load #4411")).display_name(&me).as_deref(),
            Some("Load #4411")
        );
        assert_eq!(room(RoomKind::Group, None).display_name(&me), None);
    }

    #[test]
    fn decodes_backend_room_kind() {
        let kind: RoomKind = serde_json::from_str("\"LOAD\"").unwrap();
        assert_eq!(kind, RoomKind::Load);
    }

    #[test]
    fn archive_day_key_is_zero_padded() {
        let day = ArchiveDay {
            room_id: RoomId::new("r1"),
            year: 2024,
            month: 3,
            day: 7,
            message_count: 12,
            created_at: Utc::now(),
        };
        assert_eq!(day.date_key(), "2024-03-07");
        assert_eq!(day.date(), NaiveDate::from_ymd_opt(2024, 3, 7));
    }

    #[test]
    fn patch_never_shrinks_read_by() {
        let mut msg: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "roomId": "r1",
            "sender": { "id": "driver" },
            "content": "on my way",
            "readBy": ["a", "b"],
            "isRead": true,
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        let patch = MessagePatch {
            is_read: Some(true),
            read_by: Some([UserId::new("c")].into_iter().collect()),
        };
        patch.apply(&mut msg);

        assert_eq!(msg.read_by.len(), 3);
        assert!(msg.is_read_by(&UserId::new("a")));
    }
}
