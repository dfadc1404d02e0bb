//! Running shell commands on behalf of the `runExternal` script binding.

use crate::error::{Result, TejsError};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

pub trait ExternalRunner {
    /// Run `command` and return its standard output.
    fn run(&self, command: &str) -> Result<String>;
}

/// Whether this platform has a shell to run external commands with.
pub fn platform_supports_external() -> bool {
    cfg!(any(unix, windows))
}

/// Runs commands with `$SHELL -c` (or `cmd /c` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir`, normally the shortcut-file root.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        ShellRunner {
            working_dir: Some(dir.into()),
        }
    }

    fn command(&self, command: &str) -> Command {
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/c", command]);
            cmd
        };

        #[cfg(not(target_os = "windows"))]
        let mut cmd = {
            let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
            let mut cmd = Command::new(shell);
            cmd.args(["-c", command]);
            cmd
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl ExternalRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<String> {
        debug!(command, "running external command");
        let output = self.command(command).output()?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(stdout.trim_end().to_string())
        } else {
            Err(TejsError::Other(format!(
                "Command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn returns_trimmed_stdout() {
        let output = ShellRunner::new().run("printf 'hi\\n\\n'").unwrap();
        assert_eq!(output, "hi");
    }

    #[test]
    fn failing_command_carries_stderr() {
        let err = ShellRunner::new().run("echo oops >&2; exit 3").unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let output = ShellRunner::in_dir(dir.path()).run("ls").unwrap();
        assert_eq!(output, "marker.txt");
    }
}
