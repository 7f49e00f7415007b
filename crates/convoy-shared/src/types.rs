use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Server-assigned user identifier.
    UserId
);

string_id!(
    /// Server-assigned chat room identifier.
    RoomId
);

string_id!(
    /// Server-assigned, globally unique message identifier.
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = RoomId::new("room-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"room-1\"");

        let back: RoomId = serde_json::from_str("\"room-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn blank_ids_are_empty() {
        assert!(UserId::new("   ").is_empty());
        assert!(!MessageId::new("m1").is_empty());
    }
}
