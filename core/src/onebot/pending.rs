/// Correlation table: echo token -> waiter of the matching response
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

/// Token -> single-use result slot of every in-flight request
#[derive(Debug, Default)]
pub struct PendingTable {
    slots: RwLock<HashMap<String, oneshot::Sender<Value>>>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a token and get the handle its response will be delivered to
    pub fn register(self: &Arc<Self>, token: &str) -> Result<PendingRequest> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            if slots.contains_key(token) {
                return Err(BridgeError::DuplicateToken(token.to_string()));
            }
            slots.insert(token.to_string(), tx);
        }
        Ok(PendingRequest {
            token: token.to_string(),
            label: None,
            rx: Some(rx),
            table: Arc::clone(self),
        })
    }

    /// Deliver a response. Returns false for unknown, late, or abandoned tokens.
    pub fn complete(&self, token: &str, payload: Value) -> bool {
        let slot = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        match slot {
            Some(tx) => tx.send(payload).is_ok(),
            None => {
                debug!("Dropping response for unknown token {}", token);
                false
            }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(token)
    }

    /// Number of requests still waiting
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, token: &str) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }
}

/// Handle to one registered request. Dropping it deregisters the token.
#[derive(Debug)]
pub struct PendingRequest {
    token: String,
    label: Option<String>,
    rx: Option<oneshot::Receiver<Value>>,
    table: Arc<PendingTable>,
}

impl PendingRequest {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Name used in timeout errors instead of the raw token
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Wait for the response, suspending only the calling task
    pub async fn wait(mut self, limit: Duration) -> Result<Value> {
        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => return Err(BridgeError::Connection("request already awaited".to_string())),
        };
        match timeout(limit, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(BridgeError::Connection(format!(
                "request {} abandoned",
                self.token
            ))),
            Err(_) => {
                debug!("Request {} timed out after {:?}", self.token, limit);
                Err(BridgeError::RequestTimeout {
                    action: self.label.clone().unwrap_or_else(|| self.token.clone()),
                })
            }
        }
        // self drops here, so a late response finds no entry
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.remove(&self.token);
    }
}
