//! Error types for the agent session layer.

use thiserror::Error;

use crate::wire::AgentId;

/// Errors surfaced by [`super::SessionRegistry`] and [`super::AgentConnection`].
///
/// Deliberately flat — callers branch on variant, never on message text.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("agent {0} is not connected")]
    NotConnected(AgentId),

    #[error("request to agent {agent_id} timed out")]
    Timeout { agent_id: AgentId },

    #[error("request to agent {agent_id} was cancelled: {reason}")]
    Cancelled { agent_id: AgentId, reason: String },

    #[error("agent {agent_id} returned error {code}: {message}")]
    RemoteError {
        agent_id: AgentId,
        code: i64,
        message: String,
    },

    #[error("protocol violation from agent {agent_id}: {details}")]
    Protocol { agent_id: AgentId, details: String },

    #[error("transport error for agent {agent_id}: {details}")]
    Transport { agent_id: AgentId, details: String },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
