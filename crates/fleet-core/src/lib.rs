//! fleet-core: agent connection and command-routing subsystem.
//!
//! Manages persistent agent connections for a fleet of remote hosts and
//! routes commands to them, falling back to direct SSH when no agent is
//! connected. Organized in layers:
//!
//! - **Wire layer** (`wire`): JSON-RPC 2.0 framing shared with `fleet-agent`.
//! - **Correlation layer** (`correlation`): request/response matching over
//!   a single connection.
//! - **Session layer** (`session`): the live per-agent connection registry,
//!   with replace-on-reconnect semantics.
//! - **Lifecycle layer** (`lifecycle`): the register/authenticate handshake
//!   and connection-rate limiting in front of it.
//! - **Router layer** (`router`): picks agent vs. SSH per command and
//!   returns a uniform result envelope.
//! - **Security primitives** (`crypto`, `redact`, `replay`, `permissions`):
//!   credential encryption, log redaction, replay protection, and the
//!   static RPC permission catalog.
//!
//! # Quick start
//!
//! ```rust
//! use fleet_core::wire::{JsonRpcRequest, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     "system.info",
//!     Some(json!({})),
//!     RequestId::new_string("req-001"),
//! );
//! let json = request.to_json().unwrap();
//! let parsed = JsonRpcRequest::from_json(&json).unwrap();
//! assert_eq!(request, parsed);
//! ```

pub mod config;
pub mod correlation;
pub mod crypto;
pub mod lifecycle;
pub mod permissions;
pub mod redact;
pub mod replay;
pub mod router;
pub mod session;
pub mod wire;

pub use config::{Config, ConfigError};
pub use correlation::{CorrelationConfig, CorrelationError, CorrelationManager, CorrelationResult};
pub use crypto::{CredentialCipher, CryptoError, CryptoResult};
pub use permissions::{method_permission, PermissionLevel};
pub use redact::redact;
pub use replay::{ReplayGuard, ReplayRejection};
pub use router::CommandRouter;
pub use session::{decode_inbound_frame, AgentConnection, SessionError, SessionRegistry, SessionResult};
pub use wire::{
    AgentId, AgentStatus, CommandOutcome, ExecutionMethod, Frame, FrameDecodeError, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, ServerId, MAX_FRAME_BYTES,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
