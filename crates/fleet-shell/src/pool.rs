//! Keyed connection pool: one live SSH session per `(host, port, user)`,
//! reused across calls instead of reconnecting for every command.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ssh2::Session;

use crate::client::{connect_and_authenticate, run_command, run_command_with_progress, ShellError, SshConfig};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    host: String,
    port: u16,
    username: String,
}

/// Holds at most one session per target. A dead session (the peer closed
/// the connection) is detected by the next command failing and is dropped
/// so the following call reconnects.
pub struct ConnectionPool {
    sessions: Mutex<HashMap<PoolKey, Session>>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn key_for(config: &SshConfig) -> PoolKey {
        PoolKey {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
        }
    }

    /// Run `command` against the target in `config`, reusing a pooled
    /// session when one exists and is still usable.
    pub fn execute(&self, config: &SshConfig, command: &str, timeout: Duration) -> Result<(bool, String), ShellError> {
        let key = Self::key_for(config);

        if let Some(session) = self.sessions.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            if let Ok(result) = run_command(session, command, timeout) {
                return Ok(result);
            }
        }

        let session = connect_and_authenticate(config)?;
        let result = run_command(&session, command, timeout)?;
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).insert(key, session);
        Ok(result)
    }

    pub fn execute_with_progress(
        &self,
        config: &SshConfig,
        command: &str,
        timeout: Duration,
        on_line: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(bool, String), ShellError> {
        let key = Self::key_for(config);

        let session = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            match sessions.remove(&key) {
                Some(existing) => existing,
                None => connect_and_authenticate(config)?,
            }
        };

        let result = run_command_with_progress(&session, command, timeout, on_line)?;
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).insert(key, session);
        Ok(result)
    }

    /// Drop any pooled session for a target, forcing the next call to
    /// reconnect. Used after a target's credentials change.
    pub fn evict(&self, config: &SshConfig) {
        let key = Self::key_for(config);
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
    }
}
