//! The agent-side command gate.
//!
//! Pure library, no process entrypoint: everything a remote command must
//! pass through before a host-side `system.exec` handler actually runs a
//! shell. The handler itself, the Docker/process invocation, and the
//! duplex connection back to the session manager are out of scope here —
//! this crate only decides allow/deny.

pub mod security;

pub use security::{
    prepare_command, validate_command, validate_docker_params, BindMount, CommandRateLimiter,
    CommandValidationError, DockerRunParams, DockerValidationError, PreparedCommand,
    RateLimitError, RatePermit,
};
