//! Agent connection registry.
//!
//! One [`AgentConnection`] per connected agent, keyed by [`AgentId`] in the
//! [`SessionRegistry`]. Request/response correlation within a connection
//! reuses [`crate::correlation::CorrelationManager`] verbatim — each
//! connection gets its own manager instance, so a reconnect never leaks
//! pending requests from the connection it replaced.

pub mod error;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::correlation::{CorrelationConfig, CorrelationError, CorrelationManager};
use crate::wire::{AgentId, Frame, FrameDecodeError, JsonRpcNotification, JsonRpcRequest, RequestId, ServerId};

pub use error::{SessionError, SessionResult};

/// Decode a frame read off `agent_id`'s socket, enforcing the wire size
/// limit before handing the bytes to the JSON parser. The transport's read
/// loop (out of scope here) calls this for every inbound frame; a
/// violation maps to [`SessionError::Protocol`] and the caller is expected
/// to close the connection with a protocol-violation code.
pub fn decode_inbound_frame(agent_id: &AgentId, text: &str) -> SessionResult<Frame> {
    Frame::decode(text).map_err(|e| {
        let details = match e {
            FrameDecodeError::TooLarge { size } => {
                format!("frame of {size} bytes exceeds the wire size limit")
            }
            FrameDecodeError::Parse(err) => format!("malformed frame: {err}"),
        };
        SessionError::Protocol {
            agent_id: agent_id.clone(),
            details,
        }
    })
}

/// A handler invoked for every notification frame received from an agent.
/// Registered per-method; dispatch runs the handler in its own task so a
/// slow handler never blocks the read loop.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, agent_id: AgentId, params: Option<Value>);
}

/// A single agent's live connection: the outbound half of the duplex
/// stream plus the correlation table for requests sent to it. The actual
/// socket read/write loop lives with whatever transport accepted the
/// connection (out of scope here); this struct only needs the outbound
/// sender and a way to tear the transport down on replace/close.
pub struct AgentConnection {
    pub agent_id: AgentId,
    pub server_id: ServerId,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Frame>,
    closer: Mutex<Option<oneshot::Sender<()>>>,
    // `new_without_cleanup`: one CorrelationManager per connection would
    // otherwise leak a background sweep task on every reconnect. Timeouts
    // are enforced explicitly in `send_request` instead.
    correlation: CorrelationManager,
}

impl AgentConnection {
    /// `closer` is fired (consumed) when this connection is replaced or
    /// unregistered, signalling the owning transport task to shut down.
    pub async fn new(
        agent_id: AgentId,
        server_id: ServerId,
        outbound: mpsc::UnboundedSender<Frame>,
        closer: oneshot::Sender<()>,
    ) -> SessionResult<Self> {
        let correlation = CorrelationManager::new_without_cleanup(CorrelationConfig::default())
            .await
            .map_err(|e| SessionError::Transport {
                agent_id: agent_id.clone(),
                details: e.to_string(),
            })?;

        Ok(Self {
            agent_id,
            server_id,
            connected_at: Utc::now(),
            outbound,
            closer: Mutex::new(Some(closer)),
            correlation,
        })
    }

    /// Send a request and await the correlated response, enforcing `timeout`.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: TimeDelta,
    ) -> SessionResult<Value> {
        let (request_id, receiver) = self
            .correlation
            .register_request(Some(timeout), params.clone().unwrap_or(Value::Null))
            .await
            .map_err(|e| SessionError::Transport {
                agent_id: self.agent_id.clone(),
                details: e.to_string(),
            })?;

        let frame = Frame::Request(JsonRpcRequest::new(method, params, request_id.clone()));
        if self.outbound.send(frame).is_err() {
            let _ = self.correlation.cancel_request(&request_id).await;
            return Err(SessionError::NotConnected(self.agent_id.clone()));
        }

        let wait = timeout.to_std().unwrap_or(std::time::Duration::from_secs(120));
        match tokio::time::timeout(wait, receiver).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(CorrelationError::Cancelled { .. }))) => Err(SessionError::Cancelled {
                agent_id: self.agent_id.clone(),
                reason: "connection closed".to_string(),
            }),
            Ok(Ok(Err(e))) => Err(SessionError::Transport {
                agent_id: self.agent_id.clone(),
                details: e.to_string(),
            }),
            Ok(Err(_)) => Err(SessionError::Cancelled {
                agent_id: self.agent_id.clone(),
                reason: "response channel dropped".to_string(),
            }),
            Err(_) => {
                let _ = self.correlation.cancel_request(&request_id).await;
                Err(SessionError::Timeout {
                    agent_id: self.agent_id.clone(),
                })
            }
        }
    }

    /// Feed a response frame read off the socket back to its waiting caller.
    pub async fn correlate_response(&self, id: &RequestId, result: Result<Value, (i64, String)>) {
        let mapped = result.map_err(|(code, message)| CorrelationError::Internal {
            message: format!("remote error {code}: {message}"),
        });
        if let Err(e) = self.correlation.correlate_response(id, mapped).await {
            debug!(agent = %self.agent_id, error = %e, "response correlation failed (late or unknown id)");
        }
    }

    /// Cancel all in-flight requests and fire the transport closer. Safe to
    /// call through a shared reference so replace-on-reconnect never needs
    /// exclusive ownership of the old connection.
    async fn shutdown(&self) {
        if let Some(closer) = self.closer.lock().await.take() {
            let _ = closer.send(());
        }
        for id in self.correlation.get_pending_request_ids().await {
            let _ = self.correlation.cancel_request(&id).await;
        }
    }
}

/// Registry of live agent connections, keyed by agent id with a secondary
/// index by server id (a server has at most one agent connection at a
/// time).
pub struct SessionRegistry {
    connections: DashMap<AgentId, Arc<AgentConnection>>,
    locks: DashMap<AgentId, Arc<Mutex<()>>>,
    by_server: DashMap<ServerId, AgentId>,
    handlers: DashMap<String, Arc<dyn NotificationHandler>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            locks: DashMap::new(),
            by_server: DashMap::new(),
            handlers: DashMap::new(),
        }
    }

    fn lock_for(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        self.locks
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Register a new connection for `agent_id`, replacing any existing
    /// one. The per-agent lock guarantees a concurrent register/unregister
    /// pair can never interleave: the old connection is fully torn down
    /// (pending requests cancelled, transport closer fired) before the new
    /// one is installed.
    pub async fn register_connection(&self, connection: AgentConnection) {
        let agent_id = connection.agent_id.clone();
        let server_id = connection.server_id.clone();
        let lock = self.lock_for(&agent_id);
        let _guard = lock.lock().await;

        if let Some((_, old)) = self.connections.remove(&agent_id) {
            warn!(agent = %agent_id, "replacing existing agent connection");
            old.shutdown().await;
        }

        self.by_server.insert(server_id, agent_id.clone());
        self.connections.insert(agent_id.clone(), Arc::new(connection));
        info!(agent = %agent_id, "agent connection registered");
    }

    pub async fn unregister_connection(&self, agent_id: &AgentId) {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;

        if let Some((_, conn)) = self.connections.remove(agent_id) {
            conn.shutdown().await;
            self.by_server.retain(|_, v| v != agent_id);
            info!(agent = %agent_id, "agent connection unregistered");
        }
    }

    pub fn is_connected(&self, agent_id: &AgentId) -> bool {
        self.connections.contains_key(agent_id)
    }

    pub fn agent_for_server(&self, server_id: &ServerId) -> Option<AgentId> {
        self.by_server.get(server_id).map(|e| e.value().clone())
    }

    /// Send a request to the agent serving `agent_id` and await its reply.
    pub async fn send_request(
        &self,
        agent_id: &AgentId,
        method: &str,
        params: Option<Value>,
        timeout: TimeDelta,
    ) -> SessionResult<Value> {
        let conn = self
            .connections
            .get(agent_id)
            .ok_or_else(|| SessionError::NotConnected(agent_id.clone()))?
            .clone();
        conn.send_request(method, params, timeout).await
    }

    pub async fn correlate_response(
        &self,
        agent_id: &AgentId,
        id: &RequestId,
        result: Result<Value, (i64, String)>,
    ) {
        if let Some(conn) = self.connections.get(agent_id).map(|e| e.clone()) {
            conn.correlate_response(id, result).await;
        }
    }

    pub fn register_notification_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.handlers.insert(method.into(), handler);
    }

    /// Dispatch an inbound notification frame to its registered handler,
    /// if any, on its own task.
    pub fn dispatch_notification(&self, agent_id: AgentId, notification: JsonRpcNotification) {
        let Some(handler) = self.handlers.get(&notification.method).map(|e| e.clone()) else {
            debug!(method = %notification.method, "no handler registered for notification");
            return;
        };
        tokio::spawn(async move {
            handler.handle(agent_id, notification.params).await;
        });
    }
}
