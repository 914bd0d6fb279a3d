//! Coder：每次进入执行 TaskPlan 中的一步
//!
//! 读取目标文件现有内容 -> 追加单步指令 -> 开启带工具的会话：逐个消费事件，
//! 工具调用经 ToolExecutor 执行并把结果写回历史后才请求下一个事件；
//! 一轮没有工具调用即本步结束，游标加一。中途失败时历史与游标都不提交。

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::events::preview;
use crate::core::{AgentError, CoderProgress, Notifier, ProgressEvent, RunState, RunStatus};
use crate::llm::{EngineEvent, LlmClient};
use crate::memory::{HistoryWindow, Message};
use crate::stages::prompts::{coder_system_prompt, step_prompt};
use crate::tools::{coder_tool_specs, ToolCall, ToolExecutor, ToolSpec};

/// 单步内默认最多的引擎轮数
pub const DEFAULT_MAX_TURNS_PER_STEP: usize = 20;
/// 工具结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 一次进入的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoderOutcome {
    /// 所有步骤已完成，本次未做任何事
    AlreadyDone,
    /// 完成了第 step_idx 步（从 0 计）
    Completed { step_idx: usize, tool_calls: usize },
}

pub struct Coder {
    llm: Arc<dyn LlmClient>,
    window: HistoryWindow,
    max_turns: usize,
    tools: Vec<ToolSpec>,
}

impl Coder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            window: HistoryWindow::unbounded(),
            max_turns: DEFAULT_MAX_TURNS_PER_STEP,
            tools: coder_tool_specs(),
        }
    }

    pub fn with_history_window(mut self, window: HistoryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// 执行一次 Coder 进入
    pub async fn step(
        &self,
        state: &mut RunState,
        executor: &mut ToolExecutor,
        notifier: &Notifier,
        cancel: &CancellationToken,
    ) -> Result<CoderOutcome, AgentError> {
        if state.coder_progress.is_none() {
            let task_plan = state.task_plan.clone().ok_or_else(|| {
                AgentError::ArchitectingFailed("coding started without a task plan".to_string())
            })?;
            state.coder_progress = Some(CoderProgress::new(task_plan));
        }
        let (step, step_idx, total) = match state.coder_progress.as_ref() {
            Some(p) => match p.current_step() {
                Some(step) => (step.clone(), p.current_step_idx(), p.total_steps()),
                None => {
                    state.status = RunStatus::Done;
                    return Ok(CoderOutcome::AlreadyDone);
                }
            },
            None => return Ok(CoderOutcome::AlreadyDone),
        };

        let existing = match executor.fs().read_file(&step.filepath) {
            Ok(content) => content,
            Err(e @ (AgentError::PathEscape(_) | AgentError::RootNotInitialized)) => return Err(e),
            Err(e) => {
                tracing::warn!(file = %step.filepath, error = %e, "could not read existing file");
                String::new()
            }
        };
        notifier.send(ProgressEvent::StepStarted {
            index: step_idx + 1,
            total,
            filepath: step.filepath.clone(),
            existing_file: !existing.is_empty(),
        });
        tracing::info!(step = step_idx + 1, total, file = %step.filepath, "coder step started");

        // 在副本上工作，整步完成后才提交
        let mut history = state.conversation_history.clone();
        if history.is_empty() {
            history.push(Message::system(coder_system_prompt()));
            history.push(Message::user(format!(
                "Original request:\n{}",
                state.user_prompt
            )));
        }
        history.push(Message::user(step_prompt(&state.user_prompt, &step, &existing)));

        let mut tool_calls = 0usize;
        let mut turns = 0usize;
        loop {
            if turns >= self.max_turns {
                return Err(AgentError::TurnLimitExceeded {
                    step: step_idx + 1,
                    max_turns: self.max_turns,
                });
            }
            turns += 1;

            let view = history.window(&self.window);
            let mut stream = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                s = self.llm.stream_turn(&view, &self.tools) => s?,
            };

            let mut text = String::new();
            let mut called_tool = false;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    ev = stream.next() => ev,
                };
                let Some(event) = next else { break };
                match event? {
                    EngineEvent::TextDelta(delta) => {
                        notifier.send(ProgressEvent::AssistantText {
                            text: delta.clone(),
                        });
                        text.push_str(&delta);
                    }
                    EngineEvent::ToolCall(call) => {
                        called_tool = true;
                        tool_calls += 1;
                        let description = ToolCall::parse(&call.name, &call.args)
                            .map(|c| c.describe())
                            .unwrap_or_else(|_| format!("Tool: {}", call.name));
                        notifier.send(ProgressEvent::ToolCall {
                            tool: call.name.clone(),
                            description,
                        });
                        history.push(Message::assistant_with_tools(
                            std::mem::take(&mut text),
                            vec![call.clone()],
                        ));

                        let outcome = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                            r = executor.execute(&call) => r?,
                        };
                        notifier.send(ProgressEvent::ToolResult {
                            tool: outcome.tool.clone(),
                            ok: outcome.ok,
                            preview: preview(&outcome.content, RESULT_PREVIEW_CHARS),
                        });
                        history.push(Message::tool_result(&call, outcome.content));
                    }
                }
            }
            if !text.is_empty() {
                history.push(Message::assistant(text));
            }
            if !called_tool {
                break;
            }
        }

        state.conversation_history = history;
        if let Some(progress) = state.coder_progress.as_mut() {
            progress.advance();
            if progress.is_terminal() {
                state.status = RunStatus::Done;
            }
        }
        notifier.send(ProgressEvent::StepCompleted {
            index: step_idx + 1,
            total,
            filepath: step.filepath.clone(),
        });
        tracing::info!(step = step_idx + 1, total, tool_calls, "coder step completed");

        Ok(CoderOutcome::Completed {
            step_idx,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ImplementationStep, TaskPlan};
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{ProjectContext, Sandbox};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(steps: &[&str]) -> (TempDir, RunState, ToolExecutor) {
        let dir = TempDir::new().unwrap();
        let ctx = ProjectContext::new(dir.path());
        ctx.ensure_root("proj").unwrap();
        let executor = ToolExecutor::with_sandbox(Sandbox::new(ctx));
        let mut state = RunState::new("build it");
        state.task_plan = Some(TaskPlan {
            implementation_steps: steps
                .iter()
                .map(|f| ImplementationStep {
                    filepath: f.to_string(),
                    task_description: format!("write {f}"),
                })
                .collect(),
        });
        (dir, state, executor)
    }

    #[tokio::test]
    async fn test_step_writes_and_advances() {
        let (dir, mut state, mut executor) = setup(&["a.txt"]);
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_turn("write_file", json!({"path": "a.txt", "content": "hi"})),
        );
        let coder = Coder::new(llm.clone());
        let outcome = coder
            .step(&mut state, &mut executor, &Notifier::silent(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CoderOutcome::Completed {
                step_idx: 0,
                tool_calls: 1
            }
        );
        assert_eq!(state.current_step_idx(), 1);
        assert_eq!(state.status, RunStatus::Done);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("proj/a.txt")).unwrap(),
            "hi"
        );
        // 工具结果回到了第二轮的上下文
        let second = llm.seen_messages(1).unwrap();
        assert_eq!(second.last().unwrap().role, crate::memory::Role::Tool);
    }

    #[tokio::test]
    async fn test_existing_content_in_step_prompt() {
        let (dir, mut state, mut executor) = setup(&["a.txt"]);
        std::fs::write(dir.path().join("proj/a.txt"), "OLD CONTENT").unwrap();
        let llm = Arc::new(ScriptedLlmClient::new());
        Coder::new(llm.clone())
            .step(&mut state, &mut executor, &Notifier::silent(), &CancellationToken::new())
            .await
            .unwrap();
        let first = llm.seen_messages(0).unwrap();
        assert!(first.last().unwrap().content.contains("OLD CONTENT"));
    }

    #[tokio::test]
    async fn test_reentry_after_terminal_is_noop() {
        let (_dir, mut state, mut executor) = setup(&[]);
        let llm = Arc::new(ScriptedLlmClient::new());
        let outcome = Coder::new(llm.clone())
            .step(&mut state, &mut executor, &Notifier::silent(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, CoderOutcome::AlreadyDone);
        assert_eq!(state.status, RunStatus::Done);
        assert_eq!(llm.turns_served(), 0);
        assert!(state.conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_turn_limit_does_not_commit() {
        let (_dir, mut state, mut executor) = setup(&["a.txt"]);
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_tool_turn("list_files", json!({}))
                .with_tool_turn("list_files", json!({})),
        );
        let err = Coder::new(llm)
            .with_max_turns(2)
            .step(&mut state, &mut executor, &Notifier::silent(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TurnLimitExceeded { step: 1, max_turns: 2 }));
        assert_eq!(state.current_step_idx(), 0);
        assert!(state.conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_step() {
        let (_dir, mut state, mut executor) = setup(&["a.txt"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Coder::new(Arc::new(ScriptedLlmClient::new()))
            .step(&mut state, &mut executor, &Notifier::silent(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(state.current_step_idx(), 0);
    }
}
