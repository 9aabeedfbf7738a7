/// Duplex frame transport: WebSocket for real backends, channels for loopback
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, http::HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Read half of a connection. Owned by exactly one reader task.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, `None` once the peer closed the stream
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>>;
}

/// Write half of a connection. Callers serialize access.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsSource {
    stream: SplitStream<WsStream>,
}

pub struct WsSink {
    sink: SplitSink<WsStream, tungstenite::Message>,
}

/// Dial the OneBot WebSocket endpoint
pub async fn connect(url: &str, access_token: &str) -> Result<(WsSink, WsSource)> {
    let mut request = url
        .into_client_request()
        .map_err(|e| BridgeError::Connection(format!("invalid WebSocket URL {}: {}", url, e)))?;

    if !access_token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| BridgeError::Config(format!("invalid access token: {}", e)))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| {
            BridgeError::Connection(format!("failed to dial websocket at {}: {}", url, e))
        })?;
    info!("Connected to OneBot backend at {}", url);

    let (sink, stream) = ws_stream.split();
    Ok((WsSink { sink }, WsSource { stream }))
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return Some(Ok(text.into_bytes())),
                Some(Ok(tungstenite::Message::Binary(data))) => return Some(Ok(data)),
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    debug!("WebSocket closed by peer: {:?}", frame);
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Some(Err(BridgeError::Connection(format!(
                        "WebSocket read error: {}",
                        e
                    ))))
                }
                None => return None,
            }
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        let text = String::from_utf8(frame)
            .map_err(|e| BridgeError::MalformedFrame(format!("outbound frame not UTF-8: {}", e)))?;
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .map_err(|e| BridgeError::Connection(format!("WebSocket send failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| BridgeError::Connection(format!("WebSocket close failed: {}", e)))
    }
}

// ─── In-memory transport ─────────────────────────────────────────────────────

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
}

pub struct MemorySink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Backend side of an in-memory connection
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<Vec<u8>>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create a connected (sink, source, peer) triple
pub fn memory_pair() -> (MemorySink, MemorySource, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MemorySink { tx: out_tx },
        MemorySource { rx: in_rx },
        MemoryPeer {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| BridgeError::Connection("peer closed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl MemoryPeer {
    /// Push a JSON frame to the client
    pub fn push_json(&self, value: &Value) -> bool {
        self.push_raw(value.to_string().into_bytes())
    }

    /// Push raw bytes, valid or not
    pub fn push_raw(&self, bytes: Vec<u8>) -> bool {
        self.inbound.send(Ok(bytes)).is_ok()
    }

    /// Simulate a broken connection
    pub fn push_error(&self, reason: &str) -> bool {
        self.inbound
            .send(Err(BridgeError::Connection(reason.to_string())))
            .is_ok()
    }

    /// Next frame the client wrote, decoded as JSON
    pub async fn next_written(&mut self) -> Option<Value> {
        let bytes = self.outbound.recv().await?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Frame written without waiting, if any
    pub fn try_next_written(&mut self) -> Option<Value> {
        let bytes = self.outbound.try_recv().ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
