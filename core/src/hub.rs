/// State hub: chat caches and the active-chat pointer
use crate::types::{ChatInfo, ChatType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Default)]
struct ChatDirectory {
    types: HashMap<String, ChatType>,
    names: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct HubState {
    active_chat: String,
    /// Replaced as a whole on refresh
    directory: ChatDirectory,
}

/// Shared, read-mostly view of known chats. Clone to share.
#[derive(Debug, Clone, Default)]
pub struct StateHub {
    state: Arc<RwLock<HubState>>,
}

impl StateHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both caches in one step
    pub fn refresh(&self, friends: &[ChatInfo], groups: &[ChatInfo]) {
        let mut directory = ChatDirectory::default();
        for chat in friends.iter().chain(groups) {
            directory.types.insert(chat.id.clone(), chat.chat_type);
            directory.names.insert(chat.id.clone(), chat.name.clone());
        }
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .directory = directory;
        info!(
            "Caches populated with {} friends and {} groups",
            friends.len(),
            groups.len()
        );
    }

    /// Point the hub at a chat. Unknown ids get a provisional name.
    pub fn set_active_chat(&self, id: &str, name: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.active_chat = id.to_string();
        if !state.directory.names.contains_key(id) {
            let fallback = if name.is_empty() { id } else { name };
            state
                .directory
                .names
                .insert(id.to_string(), fallback.to_string());
        }
    }

    /// Active chat id, empty when none is set
    pub fn active_chat(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_chat
            .clone()
    }

    /// "group", "private", or empty when unknown
    pub fn get_chat_type(&self, id: &str) -> String {
        self.chat_type(id)
            .map(|t| t.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn chat_type(&self, id: &str) -> Option<ChatType> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .directory
            .types
            .get(id)
            .copied()
    }

    /// Display name, empty when unknown
    pub fn get_chat_name(&self, id: &str) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .directory
            .names
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Active chat id and its type, read under one lock
    pub fn active_target(&self) -> (String, Option<ChatType>) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let chat_type = state.directory.types.get(&state.active_chat).copied();
        (state.active_chat.clone(), chat_type)
    }
}
