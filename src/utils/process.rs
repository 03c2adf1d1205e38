//! Shell command execution shared by the command-backed runners

use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Captured result of one shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Whether the program a command line starts with can be found.
///
/// Bare names are looked up on PATH; anything containing a path separator is
/// resolved against `cwd`.
pub fn program_available(command_line: &str, cwd: &Path) -> bool {
    let Some(program) = command_line.split_whitespace().next() else {
        return false;
    };

    if program.contains('/') || program.contains('\\') {
        let path = Path::new(program);
        if path.is_absolute() {
            path.exists()
        } else {
            cwd.join(path).exists()
        }
    } else {
        which::which(program).is_ok()
    }
}

/// Run `command_line` through the platform shell inside `cwd`.
///
/// `stdin` is written to the child and then closed. When the deadline passes
/// the child is killed and the output is marked `timed_out`.
pub async fn run_shell(
    command_line: &str,
    cwd: &Path,
    stdin: Option<&str>,
    deadline: Duration,
) -> std::io::Result<CommandOutput> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c");
        cmd
    };
    cmd.arg(command_line)
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    log::debug!("[Process] Running `{}` in {:?}", command_line, cwd);
    let mut child = cmd.spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        // Writing from a task keeps a chatty child from blocking on a full stdout pipe
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                log::debug!("[Process] Child closed stdin early: {}", e);
            }
        });
    }

    match timeout(deadline, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(CommandOutput {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                timed_out: false,
            })
        }
        Err(_) => {
            log::warn!(
                "[Process] `{}` timed out after {} seconds",
                command_line,
                deadline.as_secs()
            );
            Ok(CommandOutput {
                timed_out: true,
                stderr: format!("Timeout after {} seconds", deadline.as_secs()),
                ..Default::default()
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_program_available() {
        let dir = TempDir::new().unwrap();
        assert!(program_available("sh -c true", dir.path()));
        assert!(!program_available(
            "this-command-definitely-does-not-exist-12345 --flag",
            dir.path()
        ));
        assert!(!program_available("", dir.path()));
        assert!(!program_available("./missing-script.sh", dir.path()));

        std::fs::write(dir.path().join("script.sh"), "#!/bin/sh\n").unwrap();
        assert!(program_available("./script.sh arg", dir.path()));
    }

    #[tokio::test]
    async fn test_run_shell_captures_output() {
        let dir = TempDir::new().unwrap();
        let output = run_shell(
            "echo out; echo err >&2; exit 3",
            dir.path(),
            None,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(output.combined().contains("out\nerr"));
    }

    #[tokio::test]
    async fn test_run_shell_stdin_and_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let output = run_shell(
            "cat; cat marker.txt",
            dir.path(),
            Some("payload "),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "payload here");
    }

    #[tokio::test]
    async fn test_run_shell_timeout() {
        let dir = TempDir::new().unwrap();
        let output = run_shell("sleep 5", dir.path(), None, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(output.timed_out);
        assert!(!output.success);
    }
}
