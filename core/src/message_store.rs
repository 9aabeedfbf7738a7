/// Message persistence: chat history stored in sled DB
/// Frugal: one tree, keys ordered per chat by time
use crate::error::{BridgeError, Result};
use crate::types::Message;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Read/write contract the fan-out and control surface rely on
pub trait MessageLog: Send + Sync {
    fn add_message(&self, msg: &Message) -> Result<()>;

    /// Newest `limit` messages of a chat, oldest first
    fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct MessageStore {
    db: sled::Db,
    seq: Arc<AtomicU64>,
}

impl MessageStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| BridgeError::Storage(format!("Failed to open messages DB: {}", e)))?;
        Ok(Self {
            db,
            seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Total stored messages across all chats
    pub fn count(&self) -> usize {
        self.db.len()
    }

    fn chat_prefix(chat_id: &str) -> Vec<u8> {
        let mut prefix = chat_id.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn key(&self, msg: &Message) -> Vec<u8> {
        let nanos = msg.timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX);
        // offset so pre-1970 stamps still sort below later ones
        let ordered = (nanos as i128 - i64::MIN as i128) as u64;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut key = Self::chat_prefix(&msg.chat_id);
        key.extend_from_slice(&ordered.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }
}

impl MessageLog for MessageStore {
    fn add_message(&self, msg: &Message) -> Result<()> {
        let value = serde_json::to_vec(msg).map_err(BridgeError::Serialization)?;
        self.db
            .insert(self.key(msg), value)
            .map_err(|e| BridgeError::Storage(format!("Failed to save message: {}", e)))?;
        Ok(())
    }

    fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for entry in self.db.scan_prefix(Self::chat_prefix(chat_id)).rev().take(limit) {
            let (_, value) =
                entry.map_err(|e| BridgeError::Storage(format!("Failed to read messages: {}", e)))?;
            match serde_json::from_slice::<Message>(&value) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("Skipping unreadable message in chat {}: {}", chat_id, e),
            }
        }
        messages.reverse();
        Ok(messages)
    }
}
