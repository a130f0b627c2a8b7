//! Direct-shell SSH fallback client.
//!
//! Blocking `ssh2` work runs on `tokio::task::spawn_blocking` so the
//! public [`ShellClient`] API is async-friendly without requiring an
//! async SSH implementation. Depends on nothing else in this workspace —
//! a caller wires it into the command router by implementing that
//! crate's `ShellExecutor` trait in terms of [`ShellClient::execute`].

pub mod client;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

pub use client::{Auth, ShellError, SshConfig};
pub use pool::ConnectionPool;

#[derive(Clone)]
pub struct ShellClient {
    pool: Arc<ConnectionPool>,
}

impl Default for ShellClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellClient {
    pub fn new() -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new()),
        }
    }

    pub async fn execute(
        &self,
        config: SshConfig,
        command: String,
        timeout: Duration,
    ) -> Result<(bool, String), ShellError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.execute(&config, &command, timeout))
            .await
            .map_err(|_| ShellError::Timeout(timeout))?
    }

    pub async fn execute_with_progress(
        &self,
        config: SshConfig,
        command: String,
        timeout: Duration,
        on_line: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Result<(bool, String), ShellError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.execute_with_progress(&config, &command, timeout, on_line.as_ref()))
            .await
            .map_err(|_| ShellError::Timeout(timeout))?
    }

    pub fn evict(&self, config: &SshConfig) {
        self.pool.evict(config);
    }
}
