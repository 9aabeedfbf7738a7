/// Bridge service: wires the adapter, state hub, storage, and presentation
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::fanout::{deliver_inbound, deliver_outbound, PresentationHandle};
use crate::hub::StateHub;
use crate::message_store::MessageLog;
use crate::onebot::{OneBotClient, ReaderState};
use crate::types::{ChatInfo, ChatType, Message, Notice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Shared handle passed to the control surface and the presenter
#[derive(Clone)]
pub struct Bridge {
    client: OneBotClient,
    hub: StateHub,
    store: Arc<dyn MessageLog>,
    notices: mpsc::UnboundedSender<Notice>,
    history_limit: usize,
    refresh_retry: Duration,
}

impl Bridge {
    /// Start the fan-out tasks for an attached client
    pub fn start(
        client: OneBotClient,
        events: mpsc::UnboundedReceiver<Message>,
        store: Arc<dyn MessageLog>,
        config: &Config,
    ) -> (Self, PresentationHandle) {
        let hub = StateHub::new();
        let capacity = config.event_queue_capacity.max(1);
        let (present_tx, present_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        tokio::spawn(deliver_outbound(
            outbound_rx,
            client.clone(),
            hub.clone(),
            store.clone(),
            present_tx.downgrade(),
            notice_tx.clone(),
        ));
        tokio::spawn(deliver_inbound(events, store.clone(), present_tx));

        let bridge = Self {
            client,
            hub,
            store,
            notices: notice_tx,
            history_limit: config.history_limit,
            refresh_retry: config.refresh_retry,
        };
        let handle = PresentationHandle {
            messages: present_rx,
            notices: notice_rx,
            outbound: outbound_tx,
        };
        (bridge, handle)
    }

    pub fn hub(&self) -> &StateHub {
        &self.hub
    }

    pub fn client(&self) -> &OneBotClient {
        &self.client
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Fetch chat lists until one attempt succeeds, then announce it.
    ///
    /// Gives up only when the connection is gone.
    pub async fn populate_caches(&self) -> Result<()> {
        info!("Starting background cache population...");
        loop {
            match self.client.list_chats().await {
                Ok((friends, groups)) => {
                    self.hub.refresh(&friends, &groups);
                    let _ = self.notices.send(Notice::CachesPopulated);
                    return Ok(());
                }
                Err(e) => {
                    if self.client.reader_state() == ReaderState::Stopped {
                        return Err(BridgeError::Connection(format!(
                            "connection lost while populating caches: {}",
                            e
                        )));
                    }
                    warn!(
                        "Failed to get chat lists: {}. Retrying in {:?}...",
                        e, self.refresh_retry
                    );
                    sleep(self.refresh_retry).await;
                }
            }
        }
    }

    /// Refresh the caches and return groups followed by friends.
    ///
    /// On failure the caches keep their previous content.
    pub async fn get_chats(&self) -> Result<Vec<ChatInfo>> {
        let (friends, groups) = self.client.list_chats().await?;
        self.hub.refresh(&friends, &groups);

        let mut chats: Vec<ChatInfo> = groups.into_iter().chain(friends).collect();
        for chat in &mut chats {
            chat.latest_preview = match self.store.get_messages(&chat.id, 1) {
                Ok(mut latest) => latest.pop().map(|m| m.content),
                Err(e) => {
                    warn!("Could not load preview for {}: {}", chat.id, e);
                    None
                }
            };
        }
        Ok(chats)
    }

    /// Switch the active chat; an empty name falls back to the id
    pub fn set_active_chat(&self, id: &str, name: &str) {
        let name = if name.is_empty() { id } else { name };
        self.hub.set_active_chat(id, name);
        info!("Switched active chat to {} ({})", id, name);
        let _ = self.notices.send(Notice::ActiveChatChanged {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Send text to the active chat and keep a local copy
    pub async fn send_to_active_chat(&self, text: &str) -> Result<(String, ChatType)> {
        let (chat_id, chat_type) = self.hub.active_target();
        if chat_id.is_empty() {
            return Err(BridgeError::NoActiveChat);
        }
        let chat_type = chat_type.ok_or_else(|| BridgeError::UnknownChatType(String::new()))?;

        self.client
            .send_message(&chat_id, chat_type.as_str(), text)
            .await?;

        let sent = Message::outgoing(&chat_id, chat_type, text, self.client.now());
        if let Err(e) = self.store.add_message(&sent) {
            warn!("Failed to persist sent message for chat {}: {}", chat_id, e);
        }
        Ok((chat_id, chat_type))
    }

    /// Stored history of a chat, oldest first
    pub fn history(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.store.get_messages(chat_id, limit)
    }
}
