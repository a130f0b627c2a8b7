//! SSH connect, authenticate, and command execution.
//!
//! Blocking by design — `ssh2` has no async API of its own. Callers on an
//! async runtime should run [`run_command`]/[`run_command_with_progress`]
//! inside `tokio::task::spawn_blocking`, which [`super::ShellClient`] does.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use ssh2::Session;
use thiserror::Error;

/// Connect timeout. Matches the original SSH service's default.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
/// Auth timeout.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);
/// Banner timeout.
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum Auth {
    Password(String),
    PrivateKey {
        private_key_path: String,
        passphrase: Option<String>,
    },
}

/// Connection parameters for a single target host.
///
/// `strict_host_key_checking` defaults to `true` regardless of environment
/// — the original implementation never relaxes this in development, and
/// neither does this one. Set it to `false` explicitly, never implicitly.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
    pub connect_timeout: Duration,
    pub auth_timeout: Duration,
    pub banner_timeout: Duration,
    pub compression: bool,
    pub strict_host_key_checking: bool,
    pub known_hosts_path: Option<String>,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: Auth) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            compression: true,
            strict_host_key_checking: true,
            known_hosts_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("SSH handshake failed: {0}")]
    Handshake(#[source] ssh2::Error),
    #[error("host key verification failed for {0}")]
    HostKeyVerificationFailed(String),
    #[error("authentication failed for {0}@{1}")]
    AuthenticationFailed(String, String),
    #[error("failed to open channel: {0}")]
    Channel(#[source] ssh2::Error),
    #[error("command execution failed: {0}")]
    Exec(#[source] ssh2::Error),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

/// Open a TCP connection, perform the SSH handshake, verify the host key
/// (unless explicitly disabled), and authenticate. Agent-forwarding and
/// known-hosts auto-discovery are both off: callers must supply explicit
/// credentials and, if strict checking is on, an explicit known_hosts path.
pub fn connect_and_authenticate(config: &SshConfig) -> Result<Session, ShellError> {
    use std::net::ToSocketAddrs;
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .and_then(|mut it| it.next().ok_or_else(|| std::io::Error::other("could not resolve host")))
        .map_err(|source| ShellError::Connect {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

    let tcp = TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(|source| ShellError::Connect {
        host: config.host.clone(),
        port: config.port,
        source,
    })?;

    let mut session = Session::new().map_err(ShellError::Handshake)?;
    session.set_compress(config.compression);
    session.set_timeout(config.banner_timeout.as_millis() as u32);
    session.set_tcp_stream(tcp);
    session.handshake().map_err(ShellError::Handshake)?;

    if config.strict_host_key_checking {
        verify_host_key(&session, config)?;
    }

    session.set_timeout(config.auth_timeout.as_millis() as u32);
    match &config.auth {
        Auth::Password(password) => {
            session
                .userauth_password(&config.username, password)
                .map_err(|_| ShellError::AuthenticationFailed(config.username.clone(), config.host.clone()))?;
        }
        Auth::PrivateKey { private_key_path, passphrase } => {
            session
                .userauth_pubkey_file(
                    &config.username,
                    None,
                    std::path::Path::new(private_key_path),
                    passphrase.as_deref(),
                )
                .map_err(|_| ShellError::AuthenticationFailed(config.username.clone(), config.host.clone()))?;
        }
    }

    if !session.authenticated() {
        return Err(ShellError::AuthenticationFailed(config.username.clone(), config.host.clone()));
    }

    session.set_timeout(0);
    Ok(session)
}

fn verify_host_key(session: &Session, config: &SshConfig) -> Result<(), ShellError> {
    let Some(known_hosts_path) = &config.known_hosts_path else {
        return Err(ShellError::HostKeyVerificationFailed(config.host.clone()));
    };

    let mut known_hosts = session.known_hosts().map_err(ShellError::Handshake)?;
    known_hosts
        .read_file(std::path::Path::new(known_hosts_path), ssh2::KnownHostFileKind::OpenSSH)
        .map_err(|_| ShellError::HostKeyVerificationFailed(config.host.clone()))?;

    let (key, _bits) = session
        .host_key()
        .ok_or_else(|| ShellError::HostKeyVerificationFailed(config.host.clone()))?;

    match known_hosts.check(&config.host, key) {
        ssh2::CheckResult::Match => Ok(()),
        _ => Err(ShellError::HostKeyVerificationFailed(config.host.clone())),
    }
}

/// Run `command` to completion and return `(success, combined_output)`.
pub fn run_command(session: &Session, command: &str, timeout: Duration) -> Result<(bool, String), ShellError> {
    let mut channel = session.channel_session().map_err(ShellError::Channel)?;
    session.set_timeout(timeout.as_millis() as u32);
    channel.exec(command).map_err(ShellError::Exec)?;

    let mut output = String::new();
    channel.read_to_string(&mut output).map_err(|_| ShellError::Timeout(timeout))?;
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr).ok();

    channel.wait_close().map_err(ShellError::Exec)?;
    let exit_status = channel.exit_status().map_err(ShellError::Exec)?;
    session.set_timeout(0);

    if exit_status == 0 {
        Ok((true, output))
    } else {
        let combined = if stderr.is_empty() { output } else { stderr };
        Ok((false, combined))
    }
}

/// Run `command`, invoking `on_line` as each line of output arrives.
/// Returns `(success, full_output)` once the command exits.
pub fn run_command_with_progress(
    session: &Session,
    command: &str,
    timeout: Duration,
    on_line: &(dyn Fn(String) + Send + Sync),
) -> Result<(bool, String), ShellError> {
    let mut channel = session.channel_session().map_err(ShellError::Channel)?;
    session.set_timeout(timeout.as_millis() as u32);
    channel.exec(command).map_err(ShellError::Exec)?;
    session.set_blocking(false);

    let mut full_output = String::new();
    let mut line_buf = String::new();
    let mut buf = [0u8; 4096];

    loop {
        match channel.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                full_output.push_str(&chunk);
                line_buf.push_str(&chunk);
                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].to_string();
                    line_buf = line_buf[pos + 1..].to_string();
                    on_line(line);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if channel.eof() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => break,
        }
    }
    if !line_buf.is_empty() {
        on_line(line_buf.clone());
    }

    session.set_blocking(true);
    channel.wait_close().map_err(ShellError::Exec)?;
    let exit_status = channel.exit_status().map_err(ShellError::Exec)?;
    session.set_timeout(0);

    Ok((exit_status == 0, full_output))
}
