/// Configuration management
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3001";
pub const DEFAULT_CONTROL_PORT: u16 = 9090;

const USAGE: &str = "[--ws-url <url>] [--access-token <token>] [--data-dir <path>] \
[--control-port <port>] [--history-limit <n>] [--request-timeout-ms <ms>] \
[--refresh-retry-secs <secs>] [--log-file <path>] [--no-console]";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OneBot WebSocket endpoint
    pub ws_url: String,

    /// Bearer token for the WebSocket handshake (empty = none)
    pub access_token: String,

    /// Directory holding the message database
    pub data_dir: PathBuf,

    /// Control server port, bound on 127.0.0.1
    pub control_port: u16,

    /// Messages loaded when the active chat changes
    pub history_limit: usize,

    /// Timeout for every correlated request
    pub request_timeout: Duration,

    /// Delay between initial cache population attempts
    pub refresh_retry: Duration,

    /// Capacity of the presentation and outbound streams
    pub event_queue_capacity: usize,

    /// Append logs here instead of stderr
    pub log_file: Option<PathBuf>,

    /// Run the line-oriented console presenter
    pub console: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            access_token: String::new(),
            data_dir: PathBuf::from(".onebridge"),
            control_port: DEFAULT_CONTROL_PORT,
            history_limit: 50,
            request_timeout: Duration::from_secs(10),
            refresh_retry: Duration::from_secs(10),
            event_queue_capacity: 256,
            log_file: None,
            console: true,
        }
    }
}

impl Config {
    /// Create config from command line arguments (args[0] is the binary name)
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--no-console" => {
                    config.console = false;
                    i += 1;
                    continue;
                }
                "-h" | "--help" => {
                    return Err(usage_error(args));
                }
                _ => {}
            }

            let value = args.get(i + 1).ok_or_else(|| {
                BridgeError::Config(format!("{} requires an argument", flag))
            })?;
            match flag {
                "--ws-url" => config.ws_url = value.clone(),
                "--access-token" => config.access_token = value.clone(),
                "--data-dir" => config.data_dir = PathBuf::from(value),
                "--control-port" => config.control_port = parse_number(flag, value)?,
                "--history-limit" => config.history_limit = parse_number(flag, value)?,
                "--request-timeout-ms" => {
                    config.request_timeout = Duration::from_millis(parse_number(flag, value)?)
                }
                "--refresh-retry-secs" => {
                    config.refresh_retry = Duration::from_secs(parse_number(flag, value)?)
                }
                "--log-file" => config.log_file = Some(PathBuf::from(value)),
                _ => return Err(usage_error(args)),
            }
            i += 2;
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("ONEBRIDGE_WS_URL") {
            if !url.is_empty() {
                config.ws_url = url;
            }
        }
        if let Ok(token) = std::env::var("ONEBRIDGE_ACCESS_TOKEN") {
            config.access_token = token;
        }
        if let Some(p) = std::env::var("ONEBRIDGE_CONTROL_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            config.control_port = p;
        }

        if !config.ws_url.starts_with("ws://") && !config.ws_url.starts_with("wss://") {
            return Err(BridgeError::Config(format!(
                "WebSocket URL must start with ws:// or wss://, got {}",
                config.ws_url
            )));
        }

        Ok(config)
    }

    /// Path of the sled message database
    pub fn message_db_path(&self) -> PathBuf {
        self.data_dir.join("messages.db")
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| BridgeError::Config(format!("{} must be a valid number, got {:?}", flag, value)))
}

fn usage_error(args: &[String]) -> BridgeError {
    BridgeError::Config(format!(
        "Usage: {} {}",
        args.first().map(String::as_str).unwrap_or("onebridge"),
        USAGE
    ))
}
