//! Agent lifecycle: handshake, heartbeat, graceful shutdown, startup
//! reconciliation.
//!
//! Grounded in the handshake control flow of the original agent WebSocket
//! handler: the first frame off a new connection must be a `register` or
//! `authenticate` message; anything else, or a missing required field,
//! closes the connection with `AUTH_FAILED` after an error frame is sent.
//! A per-IP connection-rate limiter sits in front of authentication,
//! independent of the per-agent replay guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::wire::{AgentId, AgentStatus, ServerId};

/// WebSocket close code used when a connection fails to authenticate.
pub const CLOSE_AUTH_FAILED: u16 = 4001;
pub const CLOSE_NORMAL: u16 = 1000;

/// How long a new connection has to send its first auth frame before it
/// is closed.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// First frame sent by a connecting agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Register {
        code: String,
        version: Option<String>,
    },
    Authenticate {
        token: String,
        version: Option<String>,
    },
}

/// Outcome handed back to the transport once a handshake completes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeReply {
    Registered {
        agent_id: String,
        token: String,
        config: Value,
    },
    Authenticated {
        agent_id: String,
        config: Value,
    },
}

#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub agent_id: AgentId,
    pub server_id: ServerId,
    pub reply: HandshakeReply,
}

/// Error returned for a failed handshake attempt. The transport is
/// expected to send an error frame and then close with [`CLOSE_AUTH_FAILED`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandshakeError {
    #[error("registration code required")]
    MissingCode,
    #[error("authentication token required")]
    MissingToken,
    #[error("invalid or expired registration code")]
    InvalidCode,
    #[error("invalid authentication token")]
    InvalidToken,
    #[error("authentication timed out")]
    Timeout,
    #[error("malformed handshake message")]
    Malformed,
    #[error("too many connection attempts, try again later")]
    RateLimited,
}

/// Registration-code exchange, backed by whatever store holds pending
/// codes. A narrow trait so this crate never names a storage technology.
#[async_trait]
pub trait RegistrationCodeStore: Send + Sync {
    async fn register_agent(
        &self,
        code: &str,
        version: Option<&str>,
    ) -> Option<(AgentId, String, Value, ServerId)>;

    async fn authenticate_agent(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Option<(AgentId, Value, ServerId)>;
}

/// Per-IP connection attempt limiter guarding the handshake. Deliberately
/// simple: a fixed window of failures per IP, reset on success.
pub struct ConnectionRateLimiter {
    max_failures: u32,
    window: Duration,
    state: Mutex<HashMap<String, (u32, Instant)>>,
}

impl ConnectionRateLimiter {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_allowed(&self, client_ip: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.get(client_ip) {
            Some((count, first_seen)) if first_seen.elapsed() < self.window => {
                *count < self.max_failures
            }
            _ => true,
        }
    }

    pub async fn record_failure(&self, client_ip: &str) {
        let mut state = self.state.lock().await;
        let entry = state
            .entry(client_ip.to_string())
            .or_insert((0, Instant::now()));
        if entry.1.elapsed() >= self.window {
            *entry = (0, Instant::now());
        }
        entry.0 += 1;
    }

    pub async fn record_success(&self, client_ip: &str) {
        self.state.lock().await.remove(client_ip);
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Drives the register/authenticate handshake for a single connecting
/// agent against a [`RegistrationCodeStore`].
pub struct HandshakeCoordinator<S: RegistrationCodeStore> {
    store: Arc<S>,
    rate_limiter: Arc<ConnectionRateLimiter>,
}

impl<S: RegistrationCodeStore> HandshakeCoordinator<S> {
    pub fn new(store: Arc<S>, rate_limiter: Arc<ConnectionRateLimiter>) -> Self {
        Self {
            store,
            rate_limiter,
        }
    }

    pub async fn accept(
        &self,
        client_ip: &str,
        message: HandshakeMessage,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        if !self.rate_limiter.is_allowed(client_ip).await {
            warn!(client_ip, "connection rejected by rate limiter");
            return Err(HandshakeError::RateLimited);
        }

        let result = match message {
            HandshakeMessage::Register { code, version } => {
                self.handle_registration(&code, version.as_deref()).await
            }
            HandshakeMessage::Authenticate { token, version } => {
                self.handle_authentication(&token, version.as_deref()).await
            }
        };

        match &result {
            Ok(_) => self.rate_limiter.record_success(client_ip).await,
            Err(_) => self.rate_limiter.record_failure(client_ip).await,
        }
        result
    }

    async fn handle_registration(
        &self,
        code: &str,
        version: Option<&str>,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        if code.is_empty() {
            return Err(HandshakeError::MissingCode);
        }
        let (agent_id, token, config, server_id) = self
            .store
            .register_agent(code, version)
            .await
            .ok_or(HandshakeError::InvalidCode)?;

        info!(agent = %agent_id, "agent registered successfully");
        Ok(HandshakeOutcome {
            agent_id: agent_id.clone(),
            server_id,
            reply: HandshakeReply::Registered {
                agent_id: agent_id.to_string(),
                token,
                config,
            },
        })
    }

    async fn handle_authentication(
        &self,
        token: &str,
        version: Option<&str>,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        if token.is_empty() {
            return Err(HandshakeError::MissingToken);
        }
        let (agent_id, config, server_id) = self
            .store
            .authenticate_agent(token, version)
            .await
            .ok_or(HandshakeError::InvalidToken)?;

        info!(agent = %agent_id, "agent authenticated successfully");
        Ok(HandshakeOutcome {
            agent_id: agent_id.clone(),
            server_id,
            reply: HandshakeReply::Authenticated {
                agent_id: agent_id.to_string(),
                config,
            },
        })
    }
}

/// Callback sink for lifecycle transitions, so the connection registry
/// never depends directly on an audit log or event bus.
#[async_trait]
pub trait LifecycleSink: Send + Sync {
    async fn on_connected(&self, agent_id: &AgentId, server_id: &ServerId);
    async fn on_disconnected(&self, agent_id: &AgentId, server_id: &ServerId);
}

/// Demotes agents left `Connected` in the backing store from a previous
/// process lifetime back to `Disconnected` at startup, since no live
/// socket can possibly still be open for them.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn agents_with_status(&self, status: AgentStatus) -> Vec<AgentId>;
    async fn set_status(&self, agent_id: &AgentId, status: AgentStatus);
}

pub async fn reconcile_stale_connections<A: AgentStore>(store: &A) -> usize {
    let stale = store.agents_with_status(AgentStatus::Connected).await;
    for agent_id in &stale {
        warn!(agent = %agent_id, "demoting stale connected agent at startup");
        store.set_status(agent_id, AgentStatus::Disconnected).await;
    }
    stale.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct FakeStore {
        valid_codes: Vec<&'static str>,
        valid_tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl RegistrationCodeStore for FakeStore {
        async fn register_agent(
            &self,
            code: &str,
            _version: Option<&str>,
        ) -> Option<(AgentId, String, Value, ServerId)> {
            if self.valid_codes.contains(&code) {
                Some((
                    AgentId("agent-1".into()),
                    "tok-123".into(),
                    json!({}),
                    ServerId("server-1".into()),
                ))
            } else {
                None
            }
        }

        async fn authenticate_agent(
            &self,
            token: &str,
            _version: Option<&str>,
        ) -> Option<(AgentId, Value, ServerId)> {
            if self.valid_tokens.contains(&token) {
                Some((AgentId("agent-1".into()), json!({}), ServerId("server-1".into())))
            } else {
                None
            }
        }
    }

    fn coordinator() -> HandshakeCoordinator<FakeStore> {
        HandshakeCoordinator::new(
            Arc::new(FakeStore {
                valid_codes: vec!["good-code"],
                valid_tokens: vec!["good-token"],
            }),
            Arc::new(ConnectionRateLimiter::new(2, Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn register_with_valid_code_succeeds() {
        let c = coordinator();
        let outcome = c
            .accept(
                "1.2.3.4",
                HandshakeMessage::Register {
                    code: "good-code".into(),
                    version: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.agent_id, AgentId("agent-1".into()));
        assert!(matches!(outcome.reply, HandshakeReply::Registered { .. }));
    }

    #[tokio::test]
    async fn register_with_invalid_code_fails() {
        let c = coordinator();
        let err = c
            .accept(
                "1.2.3.4",
                HandshakeMessage::Register {
                    code: "bad-code".into(),
                    version: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidCode));
    }

    #[tokio::test]
    async fn authenticate_with_empty_token_is_rejected_before_store_lookup() {
        let c = coordinator();
        let err = c
            .accept(
                "1.2.3.4",
                HandshakeMessage::Authenticate {
                    token: "".into(),
                    version: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MissingToken));
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_rate_limiter() {
        let c = coordinator();
        for _ in 0..2 {
            let _ = c
                .accept(
                    "9.9.9.9",
                    HandshakeMessage::Authenticate {
                        token: "nope".into(),
                        version: None,
                    },
                )
                .await;
        }
        let err = c
            .accept(
                "9.9.9.9",
                HandshakeMessage::Authenticate {
                    token: "nope".into(),
                    version: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::RateLimited));
    }

    #[tokio::test]
    async fn success_resets_rate_limit_counter() {
        let c = coordinator();
        let _ = c
            .accept(
                "8.8.8.8",
                HandshakeMessage::Authenticate {
                    token: "nope".into(),
                    version: None,
                },
            )
            .await;
        let _ = c
            .accept(
                "8.8.8.8",
                HandshakeMessage::Authenticate {
                    token: "good-token".into(),
                    version: None,
                },
            )
            .await
            .unwrap();
        assert!(c.rate_limiter.is_allowed("8.8.8.8").await);
    }

    struct FakeAgentStore {
        connected: TokioMutex<Vec<AgentId>>,
        demotions: AtomicU32,
    }

    #[async_trait]
    impl AgentStore for FakeAgentStore {
        async fn agents_with_status(&self, status: AgentStatus) -> Vec<AgentId> {
            if status == AgentStatus::Connected {
                self.connected.lock().await.clone()
            } else {
                vec![]
            }
        }

        async fn set_status(&self, _agent_id: &AgentId, _status: AgentStatus) {
            self.demotions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn startup_reconciliation_demotes_stale_connected_agents() {
        let store = FakeAgentStore {
            connected: TokioMutex::new(vec![AgentId("a".into()), AgentId("b".into())]),
            demotions: AtomicU32::new(0),
        };
        let demoted = reconcile_stale_connections(&store).await;
        assert_eq!(demoted, 2);
        assert_eq!(store.demotions.load(Ordering::SeqCst), 2);
    }
}
