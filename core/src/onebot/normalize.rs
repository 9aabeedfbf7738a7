/// Event normalizer: raw OneBot message event -> Message
use crate::error::{BridgeError, Result};
use crate::onebot::protocol::{id_string, Attributes};
use crate::types::{ChatType, Message};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// Build a Message from a `post_type: message` event.
///
/// Private chats are keyed by the sender id, group chats by `group_id`.
/// Events missing content, sender id, or a usable chat discriminator are
/// rejected with `Unroutable`.
pub fn normalize(raw: &Attributes, at: DateTime<Utc>) -> Result<Message> {
    let content = raw
        .get("raw_message")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Unroutable("missing raw_message".to_string()))?;

    let sender_id = raw
        .get("user_id")
        .and_then(id_string)
        .ok_or_else(|| BridgeError::Unroutable("missing user_id".to_string()))?;

    let chat_type: ChatType = raw
        .get("message_type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Unroutable("missing message_type".to_string()))?
        .parse()
        .map_err(|e: BridgeError| BridgeError::Unroutable(e.to_string()))?;

    let chat_id = match chat_type {
        ChatType::Group => raw.get("group_id").and_then(id_string).unwrap_or_default(),
        ChatType::Private => sender_id.clone(),
    };
    if chat_id.is_empty() {
        return Err(BridgeError::Unroutable("empty chat id".to_string()));
    }

    let sender_name = raw
        .get("sender")
        .and_then(|s| s.get("nickname"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Message {
        chat_id,
        chat_type,
        sender_id,
        sender_name,
        content: content.to_string(),
        timestamp: at,
    })
}

/// Hands out strictly increasing timestamps within one process.
///
/// Shared between the reader and locally sent messages, so a wall-clock
/// step backwards never reorders them.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::nanoseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}
