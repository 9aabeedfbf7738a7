/// Connection reader loop: the only consumer of the inbound stream
use crate::onebot::normalize::{normalize, MonotonicClock};
use crate::onebot::pending::PendingTable;
use crate::onebot::protocol::{classify, decode, FrameKind, POST_TYPE_MESSAGE};
use crate::onebot::transport::FrameSource;
use crate::types::Message;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Lifecycle of the reader loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Running,
    Stopped,
}

pub struct ConnectionReader {
    source: Box<dyn FrameSource>,
    pending: Arc<PendingTable>,
    /// Unbounded so a slow consumer never holds back response routing
    events: mpsc::UnboundedSender<Message>,
    state: watch::Sender<ReaderState>,
    clock: Arc<MonotonicClock>,
}

impl ConnectionReader {
    pub fn new(
        source: Box<dyn FrameSource>,
        pending: Arc<PendingTable>,
        events: mpsc::UnboundedSender<Message>,
        state: watch::Sender<ReaderState>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            source,
            pending,
            events,
            state,
            clock,
        }
    }

    /// Read until the connection fails or closes, then mark the loop
    /// stopped and close the event queue.
    pub async fn run(mut self) {
        info!("Adapter listener started");
        loop {
            match self.source.next_frame().await {
                Some(Ok(payload)) => self.dispatch(&payload),
                Some(Err(e)) => {
                    warn!("Adapter read error: {}. Listener is shutting down.", e);
                    break;
                }
                None => {
                    warn!("Connection closed by backend. Listener is shutting down.");
                    break;
                }
            }
        }
        self.state.send_replace(ReaderState::Stopped);
        // dropping self.events ends the stream for every downstream consumer
    }

    fn dispatch(&self, payload: &[u8]) {
        debug!("Adapter received raw payload: {}", String::from_utf8_lossy(payload));

        let attrs = match decode(payload) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!("Discarding frame: {}", e);
                return;
            }
        };

        match classify(&attrs) {
            FrameKind::Response(token) => {
                let token = token.to_string();
                if !self.pending.complete(&token, Value::Object(attrs)) {
                    debug!("No waiter for response {}", token);
                }
            }
            FrameKind::Event(POST_TYPE_MESSAGE) => match normalize(&attrs, self.clock.now()) {
                Ok(msg) => {
                    if self.events.send(msg).is_err() {
                        debug!("Event queue has no consumer, dropping message");
                    }
                }
                Err(e) => debug!("Ignoring message event: {}", e),
            },
            FrameKind::Event(other) => debug!("Ignoring {} event", other),
            FrameKind::Other => debug!("Ignoring frame without echo or post_type"),
        }
    }
}
