//! Real-time channel wire protocol.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Inbound frames are validated here so that the sync engine only ever sees
//! well-formed [`InboundEvent`]s; anything else becomes a [`ProtocolError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::models::{FileRef, Message, ReplyRef};
use crate::types::{MessageId, RoomId, UserId};

pub const EVENT_NEW_MESSAGE: &str = "newMessage";
pub const EVENT_MESSAGE_READ: &str = "messageRead";
pub const EVENT_MESSAGES_MARKED_AS_READ: &str = "messagesMarkedAsRead";
pub const EVENT_USER_ONLINE: &str = "userOnline";

/// Events delivered to the sync engine.
///
/// The lifecycle variants are synthesized by the channel itself, never
/// decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(Message),
    /// A single reader acknowledged a message.
    MessageRead {
        message_id: MessageId,
        read_by: UserId,
        room_id: Option<RoomId>,
    },
    /// A user read a batch of messages in one room.
    MessagesMarkedAsRead {
        room_id: RoomId,
        message_ids: Vec<MessageId>,
        user_id: UserId,
    },
    UserOnline {
        user_id: UserId,
        online: bool,
    },
    Connected,
    Disconnected,
    Reconnected,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageReadPayload {
    message_id: MessageId,
    read_by: UserId,
    #[serde(default)]
    room_id: Option<RoomId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkedAsReadPayload {
    room_id: RoomId,
    message_ids: Vec<MessageId>,
    user_id: UserId,
}

fn default_online() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserOnlinePayload {
    user_id: UserId,
    #[serde(default = "default_online")]
    online: bool,
}

impl InboundEvent {
    /// Decode and validate one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        Self::from_parts(&frame.event, frame.data)
    }

    pub fn from_parts(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            EVENT_NEW_MESSAGE => {
                let message: Message = serde_json::from_value(data)?;
                require(!message.id.is_empty(), "id")?;
                require(!message.room_id.is_empty(), "roomId")?;
                require(!message.sender.id.is_empty(), "sender.id")?;
                Ok(Self::NewMessage(message))
            }
            EVENT_MESSAGE_READ => {
                let p: MessageReadPayload = serde_json::from_value(data)?;
                require(!p.message_id.is_empty(), "messageId")?;
                require(!p.read_by.is_empty(), "readBy")?;
                Ok(Self::MessageRead {
                    message_id: p.message_id,
                    read_by: p.read_by,
                    room_id: p.room_id.filter(|r| !r.is_empty()),
                })
            }
            EVENT_MESSAGES_MARKED_AS_READ => {
                let p: MarkedAsReadPayload = serde_json::from_value(data)?;
                require(!p.room_id.is_empty(), "roomId")?;
                require(!p.user_id.is_empty(), "userId")?;
                let message_ids = p
                    .message_ids
                    .into_iter()
                    .filter(|id| !id.is_empty())
                    .collect();
                Ok(Self::MessagesMarkedAsRead {
                    room_id: p.room_id,
                    message_ids,
                    user_id: p.user_id,
                })
            }
            EVENT_USER_ONLINE => {
                let p: UserOnlinePayload = serde_json::from_value(data)?;
                require(!p.user_id.is_empty(), "userId")?;
                Ok(Self::UserOnline {
                    user_id: p.user_id,
                    online: p.online,
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn require(ok: bool, field: &'static str) -> Result<(), ProtocolError> {
    if ok {
        Ok(())
    } else {
        Err(ProtocolError::MissingField(field))
    }
}

/// Events the client emits over the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: RoomId,
        content: Option<String>,
        file_data: Option<FileRef>,
        reply_to: Option<ReplyRef>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    MarkRoomRead { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: MessageId,
        room_id: RoomId,
    },
}

impl OutboundEvent {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
