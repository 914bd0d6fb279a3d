//! Shell 执行器：在项目目录内执行命令
//!
//! 通过 sh -c / cmd /C 执行，工作目录默认项目根目录（或经沙箱解析的子目录）；
//! 非零退出码属于正常结果；超时后子进程随 future 一起被 kill，不会无限等待。
//! 命中禁止子串（rm -rf /、fork bomb 等）的命令在启动前拒绝。

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::core::AgentError;
use crate::tools::Sandbox;

/// 默认禁止的命令子串
pub const DEFAULT_DENY_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    "chmod -r 777 /",
    ":(){ :|:& };:", // fork bomb
];

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Shell 工具：禁止模式 + 超时 + 输出截断
#[derive(Debug, Clone)]
pub struct ShellRunner {
    sandbox: Sandbox,
    deny_patterns: Vec<String>,
    default_timeout: Duration,
    max_timeout: Duration,
    max_output_chars: usize,
}

impl ShellRunner {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            deny_patterns: DEFAULT_DENY_PATTERNS.iter().map(|s| s.to_string()).collect(),
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(600),
            max_output_chars: 20_000,
        }
    }

    pub fn with_deny_patterns(mut self, patterns: Vec<String>) -> Self {
        self.deny_patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn with_timeouts(mut self, default_secs: u64, max_secs: u64) -> Self {
        self.default_timeout = Duration::from_secs(default_secs.max(1));
        self.max_timeout = Duration::from_secs(max_secs.max(default_secs).max(1));
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    fn check_allowed(&self, cmd: &str) -> Result<(), AgentError> {
        if cmd.trim().is_empty() {
            return Err(AgentError::CommandRejected("empty command".to_string()));
        }
        let lower = cmd.to_lowercase();
        match self.deny_patterns.iter().find(|p| lower.contains(p.as_str())) {
            Some(p) => Err(AgentError::CommandRejected(format!("forbidden pattern: {p}"))),
            None => Ok(()),
        }
    }

    fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        requested_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout)
    }

    /// 执行命令；超时返回 CommandTimeout
    pub async fn run_command(
        &self,
        cmd: &str,
        cwd: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> Result<CommandOutput, AgentError> {
        self.check_allowed(cmd)?;
        let dir = match cwd {
            Some(c) => self.sandbox.resolve(c)?,
            None => self.sandbox.root()?.to_path_buf(),
        };
        if !dir.is_dir() {
            return Err(AgentError::NotADirectory(
                cwd.unwrap_or(".").to_string(),
            ));
        }
        let timeout = self.effective_timeout(timeout_secs);

        tracing::info!(command = %cmd, cwd = %dir.display(), timeout_secs = timeout.as_secs(), "run_command");

        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", cmd]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", cmd]);
            c
        };
        command
            .current_dir(&dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| AgentError::CommandTimeout {
                cmd: cmd.to_string(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| AgentError::Io(format!("spawn failed: {e}")))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate(&String::from_utf8_lossy(&output.stdout), self.max_output_chars),
            stderr: truncate(&String::from_utf8_lossy(&output.stderr), self.max_output_chars),
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}\n...[truncated]")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::ProjectContext;
    use std::time::Instant;
    use tempfile::TempDir;

    fn runner_in(dir: &TempDir) -> ShellRunner {
        let ctx = ProjectContext::new(dir.path());
        ctx.ensure_root("shell test").unwrap();
        ShellRunner::new(Sandbox::new(ctx))
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_data() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir);
        let out = runner
            .run_command("echo out; echo err >&2; exit 3", None, None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_runs_in_project_root_and_subdir() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir);
        let root = runner.sandbox.root().unwrap().to_path_buf();
        std::fs::create_dir_all(root.join("sub")).unwrap();

        let out = runner.run_command("pwd", None, None).await.unwrap();
        assert_eq!(out.stdout.trim(), root.display().to_string());
        let out = runner.run_command("pwd", Some("sub"), None).await.unwrap();
        assert_eq!(out.stdout.trim(), root.join("sub").display().to_string());
    }

    #[tokio::test]
    async fn test_cwd_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir);
        assert!(matches!(
            runner.run_command("ls", Some("../.."), None).await,
            Err(AgentError::PathEscape(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_returns_promptly() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir);
        let start = Instant::now();
        let result = runner.run_command("sleep 60", None, Some(1)).await;
        assert!(matches!(
            result,
            Err(AgentError::CommandTimeout { timeout_secs: 1, .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_forbidden_pattern_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir);
        assert!(matches!(
            runner.run_command("rm -rf / --no-preserve-root", None, None).await,
            Err(AgentError::CommandRejected(_))
        ));
    }

    #[test]
    fn test_requested_timeout_is_capped() {
        let dir = TempDir::new().unwrap();
        let runner = runner_in(&dir).with_timeouts(30, 120);
        assert_eq!(runner.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(runner.effective_timeout(Some(5)), Duration::from_secs(5));
        assert_eq!(runner.effective_timeout(Some(9999)), Duration::from_secs(120));
    }

    #[test]
    fn test_truncate_long_output() {
        let s = "x".repeat(50);
        assert_eq!(truncate(&s, 100), s);
        assert!(truncate(&s, 10).ends_with("[truncated]"));
    }
}
