//! 工具执行器（Tool Surface）
//!
//! 把引擎的 ToolInvocation 解析为 ToolCall 并分发到 SafeFs / ShellRunner；
//! 失败经 RecoveryEngine 判定：可恢复的作为失败结果回传引擎，不可恢复的向上返回终止运行。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::Instant;

use serde::Serialize;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::ToolInvocation;
use crate::tools::{SafeFs, Sandbox, ShellRunner, ToolCall};

/// 单次工具调用的结果（写回对话历史的内容）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub ok: bool,
    pub timed_out: bool,
    pub content: String,
}

/// Tool Surface：五个沙箱操作 + 审计 + 错误吸收
pub struct ToolExecutor {
    fs: SafeFs,
    shell: ShellRunner,
    recovery: RecoveryEngine,
    files_written: Vec<String>,
}

impl ToolExecutor {
    pub fn new(fs: SafeFs, shell: ShellRunner, recovery: RecoveryEngine) -> Self {
        Self {
            fs,
            shell,
            recovery,
            files_written: Vec::new(),
        }
    }

    /// 使用默认 Shell 配置
    pub fn with_sandbox(sandbox: Sandbox) -> Self {
        Self::new(
            SafeFs::new(sandbox.clone()),
            ShellRunner::new(sandbox),
            RecoveryEngine::new(),
        )
    }

    pub fn fs(&self) -> &SafeFs {
        &self.fs
    }

    /// 成功写入过的文件（相对路径，按首次写入顺序，去重）
    pub fn files_written(&self) -> &[String] {
        &self.files_written
    }

    /// 执行一次引擎请求的工具调用；仅在错误需要终止运行时返回 Err
    pub async fn execute(&mut self, invocation: &ToolInvocation) -> Result<ToolOutcome, AgentError> {
        let start = Instant::now();
        let result = match ToolCall::parse(&invocation.name, &invocation.args) {
            Ok(call) => self.dispatch(&call).await,
            Err(e) => Err(e),
        };

        let outcome_label = match &result {
            Ok(_) => "ok",
            Err(AgentError::CommandTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": invocation.name,
            "ok": result.is_ok(),
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&invocation.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(content) => Ok(ToolOutcome {
                tool: invocation.name.clone(),
                ok: true,
                timed_out: false,
                content,
            }),
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::ReportToEngine => {
                    tracing::warn!(tool = %invocation.name, error = %e, "tool failed, reporting to engine");
                    Ok(ToolOutcome {
                        tool: invocation.name.clone(),
                        ok: false,
                        timed_out: matches!(e, AgentError::CommandTimeout { .. }),
                        content: error_payload(&e),
                    })
                }
                RecoveryAction::AbortRun => Err(e),
            },
        }
    }

    async fn dispatch(&mut self, call: &ToolCall) -> Result<String, AgentError> {
        match call {
            ToolCall::ReadFile { path } => self.fs.read_file(path),
            ToolCall::WriteFile { path, content } => {
                let confirmation = self.fs.write_file(path, content)?;
                let resolved = self.fs.sandbox().resolve(path)?;
                let rel = self.fs.sandbox().relative(&resolved)?;
                if !self.files_written.contains(&rel) {
                    self.files_written.push(rel);
                }
                Ok(confirmation)
            }
            ToolCall::ListFiles { directory } => {
                let files = self.fs.list_files(directory)?;
                Ok(if files.is_empty() {
                    "No files found.".to_string()
                } else {
                    files.join("\n")
                })
            }
            ToolCall::GetCurrentDirectory => self.fs.get_current_directory(),
            ToolCall::RunCommand {
                cmd,
                cwd,
                timeout_secs,
            } => {
                let output = self
                    .shell
                    .run_command(cmd, cwd.as_deref(), *timeout_secs)
                    .await?;
                serde_json::to_string(&output).map_err(|e| AgentError::Io(e.to_string()))
            }
        }
    }
}

/// 失败结果的文本：超时带 timed_out 标记，便于引擎识别
fn error_payload(e: &AgentError) -> String {
    match e {
        AgentError::CommandTimeout { .. } => serde_json::json!({
            "error": e.to_string(),
            "timed_out": true,
        })
        .to_string(),
        _ => format!("ERROR: {e}"),
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ProjectContext;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor_in(dir: &TempDir) -> ToolExecutor {
        let ctx = ProjectContext::new(dir.path());
        ctx.ensure_root("exec test").unwrap();
        ToolExecutor::with_sandbox(Sandbox::new(ctx))
    }

    fn call(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new("id", name, args)
    }

    #[tokio::test]
    async fn test_write_and_read_through_surface() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec
            .execute(&call("write_file", json!({"path": "index.html", "content": "Hello World"})))
            .await
            .unwrap();
        assert!(out.ok);
        assert!(out.content.starts_with("WROTE:"));

        let out = exec
            .execute(&call("read_file", json!({"path": "index.html"})))
            .await
            .unwrap();
        assert_eq!(out.content, "Hello World");
        assert_eq!(exec.files_written(), ["index.html"]);
    }

    #[tokio::test]
    async fn test_unsupported_tool_reported() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec.execute(&call("delete_all", json!({}))).await.unwrap();
        assert!(!out.ok);
        assert!(out.content.contains("Unsupported tool"));
    }

    #[tokio::test]
    async fn test_path_escape_reported_by_default() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec
            .execute(&call("write_file", json!({"path": "../../x", "content": "x"})))
            .await
            .unwrap();
        assert!(!out.ok);
        assert!(out.content.contains("escapes project root"));
        assert!(exec.files_written().is_empty());
    }

    #[tokio::test]
    async fn test_path_escape_can_abort() {
        let dir = TempDir::new().unwrap();
        let ctx = ProjectContext::new(dir.path());
        ctx.ensure_root("strict").unwrap();
        let sandbox = Sandbox::new(ctx);
        let mut exec = ToolExecutor::new(
            SafeFs::new(sandbox.clone()),
            ShellRunner::new(sandbox),
            RecoveryEngine::new().with_abort_on_path_escape(true),
        );
        let result = exec
            .execute(&call("read_file", json!({"path": "../../etc/passwd"})))
            .await;
        assert!(matches!(result, Err(AgentError::PathEscape(_))));
    }

    #[tokio::test]
    async fn test_root_not_initialized_aborts() {
        let dir = TempDir::new().unwrap();
        let mut exec = ToolExecutor::with_sandbox(Sandbox::new(ProjectContext::new(dir.path())));
        let result = exec.execute(&call("get_current_directory", json!({}))).await;
        assert!(matches!(result, Err(AgentError::RootNotInitialized)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout_is_a_result() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec
            .execute(&call("run_command", json!({"cmd": "sleep 60", "timeout": 1})))
            .await
            .unwrap();
        assert!(!out.ok);
        assert!(out.timed_out);
        assert!(out.content.contains("\"timed_out\":true"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_json() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec
            .execute(&call("run_command", json!({"cmd": "exit 2"})))
            .await
            .unwrap();
        assert!(out.ok);
        let parsed: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed["exit_code"], 2);
    }

    #[tokio::test]
    async fn test_list_files_on_missing_dir_reported() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor_in(&dir);
        let out = exec
            .execute(&call("list_files", json!({"directory": "nope"})))
            .await
            .unwrap();
        assert!(!out.ok);
        assert!(out.content.contains("Not a directory"));
    }
}
