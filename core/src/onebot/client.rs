/// OneBot action client: fire-and-forget and correlated requests over one connection
use crate::config::Config;
use crate::error::Result;
use crate::onebot::normalize::MonotonicClock;
use crate::onebot::pending::PendingTable;
use crate::onebot::protocol::{
    self, encode, parse_friend_list, parse_group_list, ACTION_GET_FRIEND_LIST,
    ACTION_GET_GROUP_LIST,
};
use crate::onebot::reader::{ConnectionReader, ReaderState};
use crate::onebot::transport::{self, FrameSink, FrameSource};
use crate::types::{ChatInfo, ChatType, Message};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to one live backend connection. Cheap to clone.
#[derive(Clone)]
pub struct OneBotClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Exclusive-write section for every outbound frame
    writer: Mutex<Box<dyn FrameSink>>,
    pending: Arc<PendingTable>,
    echo_counter: AtomicU64,
    request_timeout: Duration,
    state: watch::Receiver<ReaderState>,
    clock: Arc<MonotonicClock>,
}

impl OneBotClient {
    /// Dial the configured WebSocket and start the reader loop
    pub async fn connect(config: &Config) -> Result<(Self, mpsc::UnboundedReceiver<Message>)> {
        let (sink, source) = transport::connect(&config.ws_url, &config.access_token).await?;
        Ok(Self::attach(sink, source, config.request_timeout))
    }

    /// Start a client over an already established transport.
    ///
    /// Spawns the reader task; the returned receiver yields normalized
    /// message events in wire order and ends when the reader stops.
    /// The reader never waits on this receiver, so responses are routed
    /// even while events pile up.
    pub fn attach<W, R>(
        sink: W,
        source: R,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Message>)
    where
        W: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        let pending = PendingTable::new();
        let clock = Arc::new(MonotonicClock::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ReaderState::Running);

        let reader = ConnectionReader::new(
            Box::new(source),
            pending.clone(),
            events_tx,
            state_tx,
            clock.clone(),
        );
        tokio::spawn(reader.run());

        let client = Self {
            inner: Arc::new(ClientInner {
                writer: Mutex::new(Box::new(sink)),
                pending,
                echo_counter: AtomicU64::new(0),
                request_timeout,
                state: state_rx,
                clock,
            }),
        };
        (client, events_rx)
    }

    pub fn reader_state(&self) -> ReaderState {
        *self.inner.state.borrow()
    }

    /// Resolves once the reader loop has stopped
    pub async fn wait_stopped(&self) {
        let mut state = self.inner.state.clone();
        // Err means the reader is gone, which only happens after Stopped
        let _ = state.wait_for(|s| *s == ReaderState::Stopped).await;
    }

    /// Number of correlated requests awaiting a response
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Timestamp from the same clock that stamps inbound events
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Write one action without waiting for any reply
    pub async fn send_fire_and_forget(&self, action: &str, params: Value) -> Result<()> {
        let frame = encode(action, params, "")?;
        self.write(frame).await
    }

    /// Write one action and wait for the response carrying its echo token.
    ///
    /// The token is deregistered on every exit path, so a response that
    /// arrives after a timeout or write failure is dropped by the reader.
    pub async fn send_request(&self, action: &str, params: Value, timeout: Duration) -> Result<Value> {
        let token = self.next_token();
        let pending = self.inner.pending.register(&token)?.with_label(action);
        let frame = encode(action, params, &token)?;
        self.write(frame).await?;
        debug!("Sent {} as {}", action, token);
        pending.wait(timeout).await
    }

    /// Fetch friends and groups concurrently. Both must succeed.
    pub async fn list_chats(&self) -> Result<(Vec<ChatInfo>, Vec<ChatInfo>)> {
        let timeout = self.inner.request_timeout;
        let friends = async {
            let resp = self.send_request(ACTION_GET_FRIEND_LIST, Value::Null, timeout).await?;
            parse_friend_list(resp)
        };
        let groups = async {
            let resp = self.send_request(ACTION_GET_GROUP_LIST, Value::Null, timeout).await?;
            parse_group_list(resp)
        };
        let (friends, groups) = tokio::try_join!(friends, groups)?;
        info!("Fetched {} friends and {} groups", friends.len(), groups.len());
        Ok((friends, groups))
    }

    /// Send a chat message; `chat_type` must be "group" or "private"
    pub async fn send_message(&self, chat_id: &str, chat_type: &str, text: &str) -> Result<()> {
        let chat_type: ChatType = chat_type.parse()?;
        let (action, params) = protocol::send_message_params(chat_id, chat_type, text)?;
        self.send_fire_and_forget(action, params).await
    }

    /// Close the write half; the backend then ends the read half
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.writer.lock().await.close().await
    }

    fn next_token(&self) -> String {
        let n = self.inner.echo_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{}", n)
    }

    async fn write(&self, frame: Vec<u8>) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        writer.send_frame(frame).await
    }
}
