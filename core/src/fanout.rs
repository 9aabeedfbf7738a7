/// Fan-out pipeline between the adapter, storage, and the presentation layer
use crate::error::BridgeError;
use crate::hub::StateHub;
use crate::message_store::MessageLog;
use crate::onebot::OneBotClient;
use crate::types::{Message, Notice, Outbound};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Everything the presentation layer holds: a live message stream that
/// ends when the connection is gone, control notices, and a way to send.
pub struct PresentationHandle {
    pub messages: mpsc::Receiver<Message>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub outbound: mpsc::Sender<Outbound>,
}

impl PresentationHandle {
    /// Queue a message for the given chat
    pub async fn send(&self, chat_id: &str, text: &str) -> bool {
        self.outbound
            .send(Outbound {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            })
            .await
            .is_ok()
    }
}

/// Persist and present every inbound message, in arrival order.
///
/// Storage failures are logged and never hold back live delivery.
/// Returns once the adapter closes the event queue; dropping
/// `presentation` then ends the presentation stream.
pub async fn deliver_inbound(
    mut events: mpsc::UnboundedReceiver<Message>,
    store: Arc<dyn MessageLog>,
    presentation: mpsc::Sender<Message>,
) {
    let mut presenting = true;
    while let Some(msg) = events.recv().await {
        if let Err(e) = store.add_message(&msg) {
            error!("Failed to persist message for chat {}: {}", msg.chat_id, e);
        }
        if presenting && presentation.send(msg).await.is_err() {
            debug!("Presentation layer gone, persisting only");
            presenting = false;
        }
    }
    info!("Inbound event stream ended");
}

/// Send presentation-originated messages through the adapter.
///
/// Successful sends are stored and echoed to the presentation stream;
/// failures come back as `Notice::SendFailed`. Holds only a weak handle
/// to the presentation stream so it never keeps it open on its own, and
/// never waits on it, so a presenter blocked on `send` cannot stall this loop.
pub async fn deliver_outbound(
    mut outbound: mpsc::Receiver<Outbound>,
    client: OneBotClient,
    hub: StateHub,
    store: Arc<dyn MessageLog>,
    presentation: mpsc::WeakSender<Message>,
    notices: mpsc::UnboundedSender<Notice>,
) {
    while let Some(Outbound { chat_id, text }) = outbound.recv().await {
        let result = match hub.chat_type(&chat_id) {
            Some(chat_type) => client
                .send_message(&chat_id, chat_type.as_str(), &text)
                .await
                .map(|()| chat_type),
            None => Err(BridgeError::UnknownChatType(String::new())),
        };
        let chat_type = match result {
            Ok(chat_type) => chat_type,
            Err(e) => {
                warn!("Failed to send to {}: {}", chat_id, e);
                let _ = notices.send(Notice::SendFailed {
                    chat_id,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let sent = Message::outgoing(&chat_id, chat_type, &text, client.now());
        if let Err(e) = store.add_message(&sent) {
            error!("Failed to persist sent message for chat {}: {}", chat_id, e);
        }
        if let Some(presentation) = presentation.upgrade() {
            echo(presentation, sent);
        }
    }
    debug!("Outbound queue closed");
}

/// Echo without blocking the outbound loop; a full stream gets the
/// message once the presenter catches up.
fn echo(presentation: mpsc::Sender<Message>, sent: Message) {
    match presentation.try_send(sent) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(sent)) => {
            debug!("Presentation stream full, deferring echo");
            tokio::spawn(async move {
                let _ = presentation.send(sent).await;
            });
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
