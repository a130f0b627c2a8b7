//! Docker container parameter validation.
//!
//! Rejects the parameter combinations that would let a container escape its
//! sandbox or read/write the host filesystem outside a narrow, explicitly
//! allowed set of read-only files.

use thiserror::Error;

/// Capabilities that grant enough host control to be rejected outright.
const DANGEROUS_CAPABILITIES: &[&str] = &["SYS_ADMIN", "SYS_PTRACE", "SYS_RAWIO", "NET_ADMIN", "ALL"];

/// Top-level host paths that may never be bind-mounted read-write, and may
/// only be bind-mounted read-only as a single file (not the whole tree).
const PROTECTED_PATHS: &[&str] = &["/", "/etc", "/var", "/usr", "/bin", "/root"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DockerValidationError {
    #[error("privileged mode is not permitted")]
    Privileged,
    #[error("capability {0} is not permitted")]
    DangerousCapability(String),
    #[error("host PID namespace is not permitted")]
    HostPidNamespace,
    #[error("host network mode is not permitted")]
    HostNetwork,
    #[error("mounting the docker socket is not permitted")]
    DockerSocketMount,
    #[error("bind mount of protected path {0} is not permitted")]
    ProtectedPathMount(String),
}

#[derive(Debug, Clone)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DockerRunParams {
    pub image: String,
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub pid_mode: Option<String>,
    pub network_mode: Option<String>,
    pub binds: Vec<BindMount>,
}

/// Whether `host_path` is exactly one of the protected roots (mounting the
/// root itself is never allowed, read-only or not).
fn is_protected_root(host_path: &str) -> bool {
    let trimmed = host_path.trim_end_matches('/');
    let normalized = if trimmed.is_empty() { "/" } else { trimmed };
    PROTECTED_PATHS.contains(&normalized)
}

/// Whether `host_path` falls under one of the protected roots without
/// being the root itself — e.g. `/etc/localtime` under `/etc`.
fn is_under_protected_root(host_path: &str) -> bool {
    PROTECTED_PATHS.iter().any(|root| {
        if *root == "/" {
            host_path.len() > 1 && host_path.starts_with('/')
        } else {
            host_path.starts_with(&format!("{root}/"))
        }
    })
}

fn validate_bind(mount: &BindMount) -> Result<(), DockerValidationError> {
    if mount.host_path == "/var/run/docker.sock" || mount.container_path == "/var/run/docker.sock" {
        return Err(DockerValidationError::DockerSocketMount);
    }

    if is_protected_root(&mount.host_path) {
        return Err(DockerValidationError::ProtectedPathMount(mount.host_path.clone()));
    }

    if is_under_protected_root(&mount.host_path) && !mount.read_only {
        return Err(DockerValidationError::ProtectedPathMount(mount.host_path.clone()));
    }

    Ok(())
}

pub fn validate_docker_params(params: &DockerRunParams) -> Result<(), DockerValidationError> {
    if params.privileged {
        return Err(DockerValidationError::Privileged);
    }

    for cap in &params.cap_add {
        if DANGEROUS_CAPABILITIES.iter().any(|d| d.eq_ignore_ascii_case(cap)) {
            return Err(DockerValidationError::DangerousCapability(cap.clone()));
        }
    }

    if params.pid_mode.as_deref() == Some("host") {
        return Err(DockerValidationError::HostPidNamespace);
    }

    if params.network_mode.as_deref() == Some("host") {
        return Err(DockerValidationError::HostNetwork);
    }

    for mount in &params.binds {
        validate_bind(mount)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> DockerRunParams {
        DockerRunParams {
            image: "alpine:latest".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn allows_plain_container() {
        assert!(validate_docker_params(&base_params()).is_ok());
    }

    #[test]
    fn rejects_privileged() {
        let mut p = base_params();
        p.privileged = true;
        assert_eq!(validate_docker_params(&p), Err(DockerValidationError::Privileged));
    }

    #[test]
    fn rejects_dangerous_capability() {
        let mut p = base_params();
        p.cap_add.push("SYS_ADMIN".to_string());
        assert_eq!(
            validate_docker_params(&p),
            Err(DockerValidationError::DangerousCapability("SYS_ADMIN".to_string()))
        );
    }

    #[test]
    fn rejects_every_named_dangerous_capability() {
        for cap in ["ALL", "SYS_ADMIN", "SYS_PTRACE", "SYS_RAWIO", "NET_ADMIN"] {
            let mut p = base_params();
            p.cap_add.push(cap.to_string());
            assert_eq!(
                validate_docker_params(&p),
                Err(DockerValidationError::DangerousCapability(cap.to_string())),
                "{cap} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_host_pid_namespace() {
        let mut p = base_params();
        p.pid_mode = Some("host".to_string());
        assert_eq!(validate_docker_params(&p), Err(DockerValidationError::HostPidNamespace));
    }

    #[test]
    fn rejects_host_network() {
        let mut p = base_params();
        p.network_mode = Some("host".to_string());
        assert_eq!(validate_docker_params(&p), Err(DockerValidationError::HostNetwork));
    }

    #[test]
    fn rejects_docker_socket_mount() {
        let mut p = base_params();
        p.binds.push(BindMount {
            host_path: "/var/run/docker.sock".to_string(),
            container_path: "/var/run/docker.sock".to_string(),
            read_only: true,
        });
        assert_eq!(validate_docker_params(&p), Err(DockerValidationError::DockerSocketMount));
    }

    #[test]
    fn rejects_protected_root_mount() {
        let mut p = base_params();
        p.binds.push(BindMount {
            host_path: "/etc".to_string(),
            container_path: "/etc".to_string(),
            read_only: true,
        });
        assert!(matches!(
            validate_docker_params(&p),
            Err(DockerValidationError::ProtectedPathMount(_))
        ));
    }

    #[test]
    fn rejects_readwrite_mount_under_protected_path() {
        let mut p = base_params();
        p.binds.push(BindMount {
            host_path: "/etc/shadow".to_string(),
            container_path: "/mnt/shadow".to_string(),
            read_only: false,
        });
        assert!(matches!(
            validate_docker_params(&p),
            Err(DockerValidationError::ProtectedPathMount(_))
        ));
    }

    #[test]
    fn allows_protected_path_readonly_single_file() {
        let mut p = base_params();
        p.binds.push(BindMount {
            host_path: "/etc/localtime".to_string(),
            container_path: "/etc/localtime".to_string(),
            read_only: true,
        });
        assert!(validate_docker_params(&p).is_ok());
    }

    #[test]
    fn allows_unprotected_path_mount() {
        let mut p = base_params();
        p.binds.push(BindMount {
            host_path: "/data/app".to_string(),
            container_path: "/data".to_string(),
            read_only: false,
        });
        assert!(validate_docker_params(&p).is_ok());
    }
}
