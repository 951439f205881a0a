//! The duplex channel to the automation runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

/// Outgoing half of the runtime connection. Pushes from the runtime are fed
/// to [`DebugController::handle_message`](crate::DebugController::handle_message).
///
/// Delivery is at most once; `false` means the message was not handed off.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, route: &str, payload: Value) -> bool;
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Keeps every message it is given. Refuses all sends after
/// [`set_connected(false)`](Self::set_connected).
#[derive(Debug)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Value)>>,
    connected: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Payloads sent on `route`, oldest first.
    pub fn sent_on(&self, route: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r == route)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, route: &str, payload: Value) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::debug!(route, "Transport offline; message refused");
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((route.to_string(), payload));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_in_order_and_refuses_when_offline() {
        let transport = RecordingTransport::new();
        assert!(transport.send("/a", json!(1)).await);
        assert!(transport.send("/b", json!(2)).await);
        transport.set_connected(false);
        assert!(!transport.send("/a", json!(3)).await);

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent_on("/a"), vec![json!(1)]);
    }
}
