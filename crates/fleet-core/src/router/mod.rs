//! Command router: routes a command through the agent when connected,
//! falling back to direct SSH otherwise.
//!
//! Control flow — including execution-time measurement spanning
//! dispatch-to-envelope-construction and the three distinct
//! "agent unavailable" diagnostics — mirrors the original command router
//! service exactly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::session::{SessionError, SessionRegistry};
use crate::wire::{AgentId, CommandOutcome, ExecutionMethod, ServerId};

/// Credentials needed to open a direct-shell connection to a server.
#[derive(Debug, Clone)]
pub struct ServerCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: String,
    pub secret: String,
}

/// Narrow capability for looking up a server's identity and credentials.
/// The router never depends on a concrete storage technology.
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn server_exists(&self, server_id: &ServerId) -> bool;
    async fn credentials(&self, server_id: &ServerId) -> Option<ServerCredentials>;
}

/// Looks up which agent, if any, serves a given server.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn agent_for_server(&self, server_id: &ServerId) -> Option<AgentId>;
}

/// Executes a command over the direct-shell fallback path. Implemented by
/// `fleet-shell`'s pooled SSH client; kept as a trait here so `fleet-core`
/// never depends on `fleet-shell`.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn execute(
        &self,
        credentials: &ServerCredentials,
        command: &str,
        timeout_secs: u64,
    ) -> Result<(bool, String), String>;

    async fn execute_with_progress(
        &self,
        credentials: &ServerCredentials,
        command: &str,
        timeout_secs: u64,
        on_line: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(bool, String), String>;
}

pub struct CommandRouter<A: AgentDirectory, S: ServerStore, X: ShellExecutor> {
    sessions: Arc<SessionRegistry>,
    agents: Arc<A>,
    servers: Arc<S>,
    shell: Arc<X>,
    prefer_agent: bool,
}

impl<A: AgentDirectory, S: ServerStore, X: ShellExecutor> CommandRouter<A, S, X> {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        agents: Arc<A>,
        servers: Arc<S>,
        shell: Arc<X>,
        prefer_agent: bool,
    ) -> Self {
        Self {
            sessions,
            agents,
            servers,
            shell,
            prefer_agent,
        }
    }

    pub async fn is_agent_available(&self, server_id: &ServerId) -> bool {
        match self.agents.agent_for_server(server_id).await {
            Some(agent_id) => self.sessions.is_connected(&agent_id),
            None => false,
        }
    }

    pub async fn available_methods(&self, server_id: &ServerId) -> Vec<ExecutionMethod> {
        let mut methods = Vec::new();
        if self.is_agent_available(server_id).await {
            methods.push(ExecutionMethod::Agent);
        }
        if self.servers.server_exists(server_id).await {
            methods.push(ExecutionMethod::Ssh);
        }
        methods
    }

    pub async fn execute(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout_secs: u64,
        force_ssh: bool,
        force_agent: bool,
    ) -> CommandOutcome {
        let start = Utc::now();
        let method = self.determine_method(server_id, force_ssh, force_agent).await;

        let mut result = match method {
            ExecutionMethod::None => {
                let reason = self.agent_unavailable_reason(server_id).await;
                return CommandOutcome::failure(ExecutionMethod::None, reason);
            }
            ExecutionMethod::Agent => self.execute_via_agent(server_id, command, timeout_secs).await,
            ExecutionMethod::Ssh => self.execute_via_ssh(server_id, command, timeout_secs).await,
        };

        let elapsed = (Utc::now() - start).num_microseconds().unwrap_or(0) as f64 / 1000.0;
        result.execution_time_ms = Some((elapsed * 100.0).round() / 100.0);

        info!(
            server = %server_id,
            method = ?result.method,
            success = result.success,
            execution_time_ms = result.execution_time_ms,
            "command executed"
        );
        result
    }

    /// Streaming output for long-running commands. Only the SSH path
    /// streams in this release — agent streaming is not yet implemented,
    /// matching the original router's behavior.
    pub async fn execute_with_progress(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout_secs: u64,
        on_line: &(dyn Fn(String) + Send + Sync),
    ) -> CommandOutcome {
        let start = Utc::now();
        let mut result = self
            .execute_via_ssh_with_progress(server_id, command, timeout_secs, on_line)
            .await;
        let elapsed = (Utc::now() - start).num_microseconds().unwrap_or(0) as f64 / 1000.0;
        result.execution_time_ms = Some((elapsed * 100.0).round() / 100.0);
        result
    }

    async fn determine_method(
        &self,
        server_id: &ServerId,
        mut force_ssh: bool,
        force_agent: bool,
    ) -> ExecutionMethod {
        if force_ssh && force_agent {
            warn!("both force_ssh and force_agent specified, preferring agent");
            force_ssh = false;
        }

        if force_agent {
            return if self.is_agent_available(server_id).await {
                ExecutionMethod::Agent
            } else {
                warn!(server = %server_id, "agent forced but not available");
                ExecutionMethod::None
            };
        }

        if force_ssh {
            return ExecutionMethod::Ssh;
        }

        if self.prefer_agent && self.is_agent_available(server_id).await {
            return ExecutionMethod::Agent;
        }

        ExecutionMethod::Ssh
    }

    async fn agent_unavailable_reason(&self, server_id: &ServerId) -> String {
        match self.agents.agent_for_server(server_id).await {
            None => "Agent not installed on this server. Please install the agent from the server settings.".to_string(),
            Some(agent_id) if !self.sessions.is_connected(&agent_id) => {
                "Agent is installed but not connected. Check that the agent is running on the server.".to_string()
            }
            Some(_) => "Agent is not available for this server.".to_string(),
        }
    }

    async fn execute_via_agent(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout_secs: u64,
    ) -> CommandOutcome {
        let Some(agent_id) = self.agents.agent_for_server(server_id).await else {
            return CommandOutcome::failure(ExecutionMethod::Agent, "Agent not found for server");
        };
        if !self.sessions.is_connected(&agent_id) {
            return CommandOutcome::failure(ExecutionMethod::Agent, "Agent not connected");
        }

        let params = json!({"command": command, "timeout": timeout_secs});
        match self
            .sessions
            .send_request(&agent_id, "system.exec", Some(params), TimeDelta::seconds(timeout_secs as i64))
            .await
        {
            Ok(value) => parse_agent_exec_result(value),
            Err(SessionError::Timeout { .. }) => {
                CommandOutcome::failure(ExecutionMethod::Agent, "Command timed out")
            }
            Err(e) => CommandOutcome::failure(ExecutionMethod::Agent, e.to_string()),
        }
    }

    async fn execute_via_ssh(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout_secs: u64,
    ) -> CommandOutcome {
        let Some(credentials) = self.servers.credentials(server_id).await else {
            return CommandOutcome::failure(ExecutionMethod::Ssh, "Server not found or credentials unavailable");
        };
        match self.shell.execute(&credentials, command, timeout_secs).await {
            Ok((success, output)) => CommandOutcome {
                success,
                output,
                method: ExecutionMethod::Ssh,
                exit_code: Some(if success { 0 } else { 1 }),
                error: None,
                execution_time_ms: None,
            },
            Err(e) => CommandOutcome::failure(ExecutionMethod::Ssh, e),
        }
    }

    async fn execute_via_ssh_with_progress(
        &self,
        server_id: &ServerId,
        command: &str,
        timeout_secs: u64,
        on_line: &(dyn Fn(String) + Send + Sync),
    ) -> CommandOutcome {
        let Some(credentials) = self.servers.credentials(server_id).await else {
            return CommandOutcome::failure(ExecutionMethod::Ssh, "Server not found or credentials unavailable");
        };
        match self
            .shell
            .execute_with_progress(&credentials, command, timeout_secs, on_line)
            .await
        {
            Ok((success, output)) => CommandOutcome {
                success,
                output,
                method: ExecutionMethod::Ssh,
                exit_code: Some(if success { 0 } else { 1 }),
                error: None,
                execution_time_ms: None,
            },
            Err(e) => CommandOutcome::failure(ExecutionMethod::Ssh, e),
        }
    }
}

fn parse_agent_exec_result(value: Value) -> CommandOutcome {
    let exit_code = value.get("exit_code").and_then(Value::as_i64).map(|v| v as i32);
    let stdout = value.get("stdout").and_then(Value::as_str).unwrap_or("");
    let stderr = value.get("stderr").and_then(Value::as_str).unwrap_or("");

    let success = exit_code == Some(0);
    CommandOutcome {
        success,
        output: if !stdout.is_empty() { stdout.to_string() } else { stderr.to_string() },
        method: ExecutionMethod::Agent,
        exit_code,
        error: if success { None } else { Some(stderr.to_string()) },
        execution_time_ms: None,
    }
}
