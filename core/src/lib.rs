/// OneBridge - OneBot v11 client bridge
///
/// Talks to a OneBot backend over a WebSocket, correlates action responses,
/// normalizes chat events, and fans them out to storage and a presenter.

pub mod error;
pub mod config;
pub mod types;
pub mod onebot;
pub mod hub;
pub mod message_store;
pub mod fanout;
pub mod bridge;
pub mod control_api;
pub mod console;
pub mod cli_app;

pub use error::{BridgeError, Result};
pub use config::Config;
pub use bridge::Bridge;
pub use hub::StateHub;
pub use onebot::OneBotClient;
