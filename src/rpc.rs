//! JSON-RPC 2.0 calls to another window over cross-window messaging.

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::RpcError;
use crate::window::MessageTarget;

pub const JSONRPC_VERSION: &str = "2.0";
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(2000);
const CORRELATION_ID_BYTES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::with_id(method, params, generate_hex_string(CORRELATION_ID_BYTES))
    }

    pub fn with_id(method: impl Into<String>, params: Vec<Value>, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Reply sent back by the window that served a request.
///
/// Only used to build replies; incoming replies are inspected as raw JSON so
/// that a `null` result is told apart from a missing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A message delivered to the local window.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub origin: String,
    pub data: Value,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Listener registry of the local window.
///
/// Whatever receives cross-window messages (a webview bridge, a test) calls
/// [`MessageBus::dispatch`]; every live [`Subscription`] gets a copy.
#[derive(Default)]
pub struct MessageBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<MessageEvent>>>,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener. It is removed when the subscription is dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().insert(id, tx);
        Subscription {
            id,
            bus: Arc::clone(self),
            rx,
        }
    }

    /// Deliver a message to every listener, returning how many received it.
    pub fn dispatch(&self, event: MessageEvent) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|_, tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in listeners.values() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners.lock().remove(&id);
    }
}

pub struct Subscription {
    id: u64,
    bus: Arc<MessageBus>,
    rx: mpsc::UnboundedReceiver<MessageEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<MessageEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// Client side of the cross-window RPC protocol.
#[derive(Clone)]
pub struct RpcChannel {
    bus: Arc<MessageBus>,
    timeout: Duration,
}

impl RpcChannel {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call `method` in `target`, accepting replies only from `origin`.
    pub async fn call<T: MessageTarget + ?Sized>(
        &self,
        target: &T,
        origin: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.send(target, origin, RpcRequest::new(method, params), self.timeout)
            .await
    }

    /// Send a prepared request with an explicit timeout.
    pub async fn send<T: MessageTarget + ?Sized>(
        &self,
        target: &T,
        origin: &str,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        // Listen before posting so a synchronous reply cannot be missed.
        let mut subscription = self.bus.subscribe();

        let payload = serde_json::to_value(&request).map_err(|err| RpcError::Post(err.to_string()))?;
        target
            .post_message(payload, origin)
            .map_err(RpcError::Post)?;
        debug!(
            "[picker:rpc] sent {} (id {}) to {}",
            request.method, request.id, origin
        );

        let reply = async {
            while let Some(event) = subscription.recv().await {
                if let Some(outcome) = match_reply(&event, origin, &request.id) {
                    return outcome;
                }
            }
            std::future::pending().await
        };

        match tokio::time::timeout(timeout, reply).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("[picker:rpc] {} to {} timed out", request.method, origin);
                Err(RpcError::Timeout {
                    origin: origin.to_string(),
                })
            }
        }
    }
}

/// Returns `None` for traffic that is not a reply to request `id`.
fn match_reply(event: &MessageEvent, origin: &str, id: &str) -> Option<Result<Value, RpcError>> {
    if event.origin != origin {
        return None;
    }

    let reply: &Map<String, Value> = event.data.as_object()?;
    if reply.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return None;
    }
    if reply.get("id").and_then(Value::as_str) != Some(id) {
        return None;
    }

    if let Some(error) = reply.get("error") {
        return Some(Err(RpcError::Remote(error.clone())));
    }
    if let Some(result) = reply.get("result") {
        return Some(Ok(result.clone()));
    }
    Some(Err(RpcError::MalformedReply))
}

/// Random lowercase hex string encoding `bytes` random bytes.
pub fn generate_hex_string(bytes: usize) -> String {
    (0..bytes)
        .map(|_| format!("{:02x}", fastrand::u8(..)))
        .collect()
}
