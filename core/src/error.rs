/// Error types for the OneBot bridge
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Duplicate request token: {0}")]
    DuplicateToken(String),

    #[error("API request timed out for action: {action}")]
    RequestTimeout { action: String },

    #[error("Unknown chat type: {0:?}")]
    UnknownChatType(String),

    #[error("Invalid chat id: {0:?}")]
    InvalidChatId(String),

    #[error("Unroutable event: {0}")]
    Unroutable(String),

    #[error("Action {action} failed with retcode {retcode}")]
    ActionFailed { action: String, retcode: i64 },

    #[error("No active chat set")]
    NoActiveChat,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
