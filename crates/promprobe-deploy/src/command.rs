//! Subprocess indirection for deployers.
//!
//! Every external tool invocation (docker, kubectl, helm) goes through
//! [`CommandRunner`] so each variant is unit-testable with a scripted fake.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured output of one finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Convenience constructor for fakes.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput>;
}

/// The real thing: spawns the command and captures its output.
#[derive(Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
        debug!(program = %program.display(), ?args, "Running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemCommandRunner;
        let output = runner
            .run(&PathBuf::from("echo"), &["hello"])
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_system_runner_reports_failure() {
        let runner = SystemCommandRunner;
        let output = runner.run(&PathBuf::from("false"), &[]).await.unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary_is_io_error() {
        let runner = SystemCommandRunner;
        let result = runner
            .run(&PathBuf::from("definitely-not-a-tool"), &[])
            .await;

        assert!(result.is_err());
    }
}
