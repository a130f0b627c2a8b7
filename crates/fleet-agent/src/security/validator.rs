//! Command allowlist validation.
//!
//! A command is rejected outright if it contains shell metacharacters that
//! could chain or substitute additional commands, regardless of whether it
//! would otherwise match the allowlist. Only then is it matched against a
//! fixed set of patterns; each pattern carries its own maximum timeout.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandValidationError {
    #[error("command contains forbidden shell metacharacters")]
    ForbiddenMetacharacters,
    #[error("command is not in the allowlist")]
    NotAllowlisted,
    #[error("requested timeout {requested}s exceeds the maximum {max}s for this command")]
    TimeoutTooLarge { requested: u64, max: u64 },
}

/// Regex, compiled once, anchored on both ends so a match covers the whole
/// command rather than a prefix. Covers every family spec.md names: Docker
/// read ops (`ps`, `version`, `info`, `inspect`, `logs`, `stats`), the
/// container-lifecycle family (`start`, `stop`, `restart`, `rm`, `run`,
/// `pull`, `exec`), system inspection, and the narrowly-scoped pull-job
/// status read.
static ALLOWLIST: LazyLock<Vec<(Regex, u64)>> = LazyLock::new(|| {
    const CONTAINER: &str = r"[A-Za-z0-9][A-Za-z0-9_.-]*";
    const IMAGE: &str = r"[A-Za-z0-9][A-Za-z0-9_./:-]*";

    let entries: Vec<(String, u64)> = vec![
        (r"^docker ps(?: --format [^\s;|&]+)?$".to_string(), 30),
        (r"^docker version$".to_string(), 30),
        (r"^docker info$".to_string(), 30),
        (format!(r"^docker inspect {CONTAINER}$"), 30),
        (format!(r"^docker logs(?: --tail \d+)? {CONTAINER}$"), 30),
        (format!(r"^docker stats --no-stream(?: {CONTAINER})?$"), 30),
        (format!(r"^docker (?:start|stop|restart|rm) {CONTAINER}$"), 30),
        (format!(r"^docker pull {IMAGE}$"), 120),
        (format!(r"^docker run -d --name {CONTAINER} {IMAGE}$"), 120),
        (format!(r"^docker exec {CONTAINER} {CONTAINER}(?: {CONTAINER})*$"), 60),
        (r"^uname -a$".to_string(), 30),
        (r"^hostname$".to_string(), 30),
        (r"^uptime$".to_string(), 30),
        (r"^df -h$".to_string(), 30),
        (r"^free -h$".to_string(), 30),
        (r"^cat /tmp/pull-job-[0-9a-fA-F]+(?:-[0-9a-fA-F]+)*/status$".to_string(), 10),
    ];
    entries
        .into_iter()
        .map(|(pattern, max)| (Regex::new(&pattern).expect("static allowlist pattern is valid"), max))
        .collect()
});

/// Shell metacharacters that permit chaining or substitution. Checked
/// before allowlist matching so a crafted command can never slip through
/// by embedding an allowlisted prefix.
const FORBIDDEN_SUBSTRINGS: &[&str] = &[";", "|", "$(", "`", "&&", "||", ">", "<", "\n"];

fn contains_forbidden_metacharacters(command: &str) -> bool {
    FORBIDDEN_SUBSTRINGS.iter().any(|s| command.contains(s))
}

/// Validate `command` against the allowlist and, if a `requested_timeout`
/// is given, against that entry's maximum timeout.
pub fn validate_command(
    command: &str,
    requested_timeout_secs: Option<u64>,
) -> Result<(), CommandValidationError> {
    if contains_forbidden_metacharacters(command) {
        return Err(CommandValidationError::ForbiddenMetacharacters);
    }

    let max_timeout = ALLOWLIST
        .iter()
        .find(|(re, _)| re.is_match(command))
        .map(|(_, max)| *max)
        .ok_or(CommandValidationError::NotAllowlisted)?;

    if let Some(requested) = requested_timeout_secs {
        if requested > max_timeout {
            return Err(CommandValidationError::TimeoutTooLarge {
                requested,
                max: max_timeout,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_plain_docker_ps() {
        assert!(validate_command("docker ps", None).is_ok());
    }

    #[test]
    fn allows_docker_ps_with_format() {
        assert!(validate_command("docker ps --format {{.Names}}", None).is_ok());
    }

    #[test]
    fn allows_system_info_commands() {
        for cmd in ["uname -a", "hostname", "uptime", "df -h", "free -h", "docker version", "docker info"] {
            assert!(validate_command(cmd, None).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn allows_docker_read_ops() {
        for cmd in [
            "docker inspect my-container",
            "docker logs my-container",
            "docker logs --tail 100 my-container",
            "docker stats --no-stream",
            "docker stats --no-stream my-container",
        ] {
            assert!(validate_command(cmd, None).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn allows_container_lifecycle_commands() {
        for cmd in [
            "docker start my-container",
            "docker stop my-container",
            "docker restart my-container",
            "docker rm my-container",
            "docker pull nginx:latest",
            "docker run -d --name my-container nginx:latest",
            "docker exec my-container uptime",
        ] {
            assert!(validate_command(cmd, None).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn allows_status_file_read_for_valid_job_id() {
        for cmd in [
            "cat /tmp/pull-job-abcd1234/status",
            "cat /tmp/pull-job-abcd1234-5678-90ab-cdef/status",
        ] {
            assert!(validate_command(cmd, None).is_ok(), "{cmd} should be allowed");
        }
    }

    #[test]
    fn rejects_status_file_read_for_malformed_job_id() {
        let cmd = "cat /tmp/../etc/passwd/status";
        assert_eq!(
            validate_command(cmd, None),
            Err(CommandValidationError::NotAllowlisted)
        );
    }

    #[test]
    fn rejects_rm_rf_root() {
        assert_eq!(
            validate_command("rm -rf /", None),
            Err(CommandValidationError::NotAllowlisted)
        );
    }

    #[test]
    fn rejects_command_chaining() {
        for cmd in [
            "docker ps; rm -rf /",
            "docker ps | cat",
            "docker ps $(whoami)",
            "docker ps `whoami`",
            "uptime && rm -rf /",
        ] {
            assert_eq!(
                validate_command(cmd, None),
                Err(CommandValidationError::ForbiddenMetacharacters),
                "{cmd} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_timeout_above_entry_maximum() {
        let err = validate_command("df -h", Some(60)).unwrap_err();
        assert_eq!(
            err,
            CommandValidationError::TimeoutTooLarge { requested: 60, max: 30 }
        );
    }

    #[test]
    fn accepts_timeout_within_entry_maximum() {
        assert!(validate_command("cat /tmp/pull-job-abcd1234-5678-90ab-cdef/status", Some(5)).is_ok());
    }

    #[test]
    fn rejects_timeout_above_pull_job_maximum() {
        let err = validate_command("cat /tmp/pull-job-abcd1234/status", Some(60)).unwrap_err();
        assert_eq!(
            err,
            CommandValidationError::TimeoutTooLarge { requested: 60, max: 10 }
        );
    }
}
