/// Shared types for the bridge layer
use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of conversation a chat id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Group,
    Private,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Group => "group",
            ChatType::Private => "private",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(ChatType::Group),
            "private" => Ok(ChatType::Private),
            other => Err(BridgeError::UnknownChatType(other.to_string())),
        }
    }
}

/// One chat message, inbound or locally sent. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Group number for group chats, peer user id for private chats
    pub chat_id: String,
    pub chat_type: ChatType,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Sender id used for messages the local user sent
pub const SELF_SENDER_ID: &str = "self";
/// Display name used for messages the local user sent
pub const SELF_SENDER_NAME: &str = "You";

impl Message {
    /// Synthesize the local copy of a message we just sent
    pub fn outgoing(chat_id: &str, chat_type: ChatType, content: &str, at: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            chat_type,
            sender_id: SELF_SENDER_ID.to_string(),
            sender_name: SELF_SENDER_NAME.to_string(),
            content: content.to_string(),
            timestamp: at,
        }
    }

    pub fn is_own(&self) -> bool {
        self.sender_id == SELF_SENDER_ID
    }
}

/// One friend or group from a list refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    /// Preview text of the newest stored message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_preview: Option<String>,
}

/// Control notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// The active chat was switched
    ActiveChatChanged { id: String, name: String },
    /// Friend and group caches were (re)loaded
    CachesPopulated,
    /// A presentation-originated send did not go out
    SendFailed { chat_id: String, reason: String },
}

/// Presentation-originated message waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_parse() {
        assert_eq!("group".parse::<ChatType>().unwrap(), ChatType::Group);
        assert_eq!("private".parse::<ChatType>().unwrap(), ChatType::Private);
        assert!(matches!(
            "guild".parse::<ChatType>(),
            Err(BridgeError::UnknownChatType(t)) if t == "guild"
        ));
    }

    #[test]
    fn test_chat_info_serializes_type_field() {
        let info = ChatInfo {
            id: "456".to_string(),
            name: "Rustaceans".to_string(),
            chat_type: ChatType::Group,
            latest_preview: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "group");
        assert!(json.get("latest_preview").is_none());
    }

    #[test]
    fn test_outgoing_message_is_own() {
        let msg = Message::outgoing("789", ChatType::Group, "hello", Utc::now());
        assert!(msg.is_own());
        assert_eq!(msg.sender_name, "You");
    }
}
