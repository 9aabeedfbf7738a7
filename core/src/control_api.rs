/// Control server: local HTTP surface for the `ctl` CLI and scripts
///
/// Endpoints:
///   GET|POST /set_active_chat   ?id=<chat id>&name=<display name>
///   POST     /send_message      body: plain text for the active chat
///   GET      /get_chats         refreshes caches, JSON array of chats
///   GET      /messages          ?chat_id=<id>&limit=N  stored history
use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

type Resp = Response<Full<Bytes>>;

const DEFAULT_HISTORY_LIMIT: usize = 50;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "POST, GET, OPTIONS, PUT, DELETE")
        .header(
            "Access-Control-Allow-Headers",
            "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization",
        )
}

fn respond(status: StatusCode, content_type: &str, body: Vec<u8>) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn text(status: StatusCode, msg: String) -> Resp {
    respond(status, "text/plain; charset=utf-8", msg.into_bytes())
}

fn json<T: serde::Serialize>(value: &T) -> Resp {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", body),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(
                    urlencoding::decode(&v.replace('+', " "))
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| v.to_string()),
                );
            }
        }
    }
    None
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub async fn start_control_server(bridge: Bridge, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("127.0.0.1:{}", port)
        .parse()
        .map_err(|e| BridgeError::Config(format!("Invalid control address: {}", e)))?;
    let listener = TcpListener::bind(addr).await.map_err(BridgeError::Io)?;
    info!("Control server listening on http://{}", addr);
    serve(listener, bridge).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, bridge: Bridge) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let io = TokioIo::new(stream);
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let bridge = bridge.clone();
                        async move { Ok::<_, Infallible>(handle(req, &bridge).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        if !e.is_incomplete_message() {
                            error!("Control server connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("Control server accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub async fn handle<B>(req: Request<B>, bridge: &Bridge) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    if method == Method::OPTIONS {
        return cors_headers(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(Bytes::new()))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    }

    match (method, path.as_str()) {
        (Method::GET | Method::POST, "/set_active_chat") => set_active_chat(&query, bridge),
        (Method::POST, "/send_message") => send_message(req, bridge).await,
        (Method::GET, "/get_chats") => get_chats(bridge).await,
        (Method::GET, "/messages") => get_messages(&query, bridge),
        _ => text(StatusCode::NOT_FOUND, "not found\n".to_string()),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

fn set_active_chat(query: &str, bridge: &Bridge) -> Resp {
    let id = query_param(query, "id").unwrap_or_default();
    if id.is_empty() {
        return text(StatusCode::BAD_REQUEST, "missing chat id\n".to_string());
    }
    let name = query_param(query, "name")
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.clone());

    bridge.set_active_chat(&id, &name);
    text(StatusCode::OK, format!("Active chat set to {} ({})\n", id, name))
}

async fn send_message<B>(req: Request<B>, bridge: &Bridge) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read request body: {}\n", e),
            )
        }
    };
    let message = String::from_utf8_lossy(&body).to_string();

    match bridge.send_to_active_chat(&message).await {
        Ok((id, chat_type)) => text(
            StatusCode::OK,
            format!("Message sent to {} ({})\n", id, chat_type),
        ),
        Err(BridgeError::NoActiveChat) => text(
            StatusCode::BAD_REQUEST,
            "No active chat set. Please set one via /set_active_chat\n".to_string(),
        ),
        Err(BridgeError::UnknownChatType(_)) => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Could not determine chat type for ID {}. Cache may be stale.\n",
                bridge.hub().active_chat()
            ),
        ),
        Err(e) => text(StatusCode::BAD_GATEWAY, format!("{}\n", e)),
    }
}

async fn get_chats(bridge: &Bridge) -> Resp {
    match bridge.get_chats().await {
        Ok(chats) => json(&chats),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)),
    }
}

fn get_messages(query: &str, bridge: &Bridge) -> Resp {
    let chat_id = query_param(query, "chat_id")
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| bridge.hub().active_chat());
    if chat_id.is_empty() {
        return text(StatusCode::BAD_REQUEST, "missing chat_id\n".to_string());
    }
    let limit = query_param(query, "limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, 500);

    match bridge.history(&chat_id, limit) {
        Ok(messages) => json(&messages),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)),
    }
}
