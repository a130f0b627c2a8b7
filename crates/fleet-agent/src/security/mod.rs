//! The agent-side command gate: everything a remote command must pass
//! through before it reaches a shell. Three independent checks, run in
//! sequence by the caller (an `system.exec` handler, out of scope here):
//! allowlist validation, Docker parameter validation, and rate limiting.

pub mod docker;
pub mod exec_mode;
pub mod rate_limit;
pub mod validator;

pub use docker::{validate_docker_params, DockerValidationError};
pub use exec_mode::{prepare_command, PreparedCommand};
pub use rate_limit::{CommandRateLimiter, RateLimitError};
pub use validator::{validate_command, CommandValidationError};
