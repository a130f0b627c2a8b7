//! Shell-vs-argv decision for a validated command.
//!
//! A command that already passed [`super::validate_command`] still has to
//! be turned into something a process spawner can run. If it contains a
//! shell metacharacter that enables redirection or expansion, it is handed
//! to a shell verbatim; otherwise it is split into an argv and spawned
//! directly, so quoting in an argument can never be reinterpreted.

/// Characters whose presence forces the shell path: redirection (`>`,
/// `<`), piping and chaining (`|`, `&`), command substitution (`` ` ``,
/// `$`), and statement separation (`;`).
const SHELL_TRIGGER_CHARS: [char; 7] = [';', '|', '&', '`', '$', '>', '<'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedCommand {
    /// No shell metacharacters present: run directly as argv, no shell.
    Argv(Vec<String>),
    /// A shell metacharacter was found: run verbatim through a shell.
    Shell(String),
}

/// Decide how to execute `command` once it has already cleared the
/// allowlist.
pub fn prepare_command(command: &str) -> PreparedCommand {
    if command.chars().any(|c| SHELL_TRIGGER_CHARS.contains(&c)) {
        return PreparedCommand::Shell(command.to_string());
    }
    PreparedCommand::Argv(split_argv(command))
}

/// Quote-aware whitespace split: single and double quotes group their
/// contents into one token and are themselves dropped from the output.
fn split_argv(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_current = false;

    for c in command.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_current = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_current = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_current {
                    args.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            c => {
                current.push(c);
                has_current = true;
            }
        }
    }
    if has_current {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_command_uses_no_shell() {
        assert_eq!(
            prepare_command("docker ps"),
            PreparedCommand::Argv(vec!["docker".to_string(), "ps".to_string()])
        );
    }

    #[test]
    fn command_with_args_uses_no_shell() {
        assert_eq!(
            prepare_command("docker run -d nginx:latest"),
            PreparedCommand::Argv(vec![
                "docker".to_string(),
                "run".to_string(),
                "-d".to_string(),
                "nginx:latest".to_string(),
            ])
        );
    }

    #[test]
    fn command_with_redirect_uses_shell() {
        let cmd = "docker inspect foo 2>/dev/null";
        assert_eq!(prepare_command(cmd), PreparedCommand::Shell(cmd.to_string()));
    }

    #[test]
    fn command_with_pipe_uses_shell() {
        assert!(matches!(prepare_command("docker ps | grep nginx"), PreparedCommand::Shell(_)));
    }

    #[test]
    fn command_with_semicolon_uses_shell() {
        assert!(matches!(prepare_command("echo foo; echo bar"), PreparedCommand::Shell(_)));
    }

    #[test]
    fn command_with_ampersand_uses_shell() {
        assert!(matches!(prepare_command("cd /tmp && ls"), PreparedCommand::Shell(_)));
    }

    #[test]
    fn command_with_backticks_uses_shell() {
        assert!(matches!(prepare_command("echo `date`"), PreparedCommand::Shell(_)));
    }

    #[test]
    fn command_with_dollar_paren_uses_shell() {
        assert!(matches!(prepare_command("echo $(date)"), PreparedCommand::Shell(_)));
    }

    #[test]
    fn quoted_arguments_are_preserved_as_single_tokens() {
        assert_eq!(
            prepare_command("docker run --name 'my app' nginx"),
            PreparedCommand::Argv(vec![
                "docker".to_string(),
                "run".to_string(),
                "--name".to_string(),
                "my app".to_string(),
                "nginx".to_string(),
            ])
        );
    }
}
