//! Request/response correlation for the bidirectional agent channel: a
//! pending-request table keyed by request id, completed by a oneshot
//! channel when the matching response frame arrives, with a background
//! sweep for requests that time out before one does.
//!
//! - `manager` - `CorrelationManager`
//! - `types` - `PendingRequest`, `RequestIdGenerator`
//! - `error` - `CorrelationError`/`CorrelationResult`
//!
//! ```rust,no_run
//! use fleet_core::correlation::{CorrelationManager, CorrelationConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = CorrelationManager::new(CorrelationConfig::default());
//! manager.start().await?;
//!
//! let (id, receiver) = manager
//!     .register_request(serde_json::json!({"method": "ping"}), None)
//!     .await?;
//! manager.correlate_response(id, serde_json::json!({"result": "pong"}))?;
//! let response = receiver.await??;
//!
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod types;

// Re-export main types for convenience
pub use error::{CorrelationError, CorrelationResult, RequestId};
pub use manager::{CorrelationConfig, CorrelationManager};
pub use types::{PendingRequest, RequestIdGenerator};
