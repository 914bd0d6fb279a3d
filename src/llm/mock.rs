//! 脚本化 LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 结构化调用按目标名返回预设 JSON；每次 stream_turn 依次弹出一轮预设事件，
//! 脚本耗尽后返回一条不含工具调用的文本（本步结束）。
//! echo 模式下不需要脚本：规划一个 README.md，并把最后一条 user 消息写进去。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::{json, Value};

use crate::core::{Plan, TaskPlan};
use crate::llm::{EngineEvent, EngineStream, LlmClient, LlmError, StructuredTarget, TokenUsage};
use crate::memory::{Message, Role, ToolInvocation};
use crate::tools::ToolSpec;

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    structured: Mutex<HashMap<String, Value>>,
    turns: Mutex<VecDeque<Vec<EngineEvent>>>,
    /// 每次 stream_turn 收到的消息（供测试断言上下文）
    seen: Mutex<Vec<Vec<Message>>>,
    next_call_id: AtomicU64,
    echo: bool,
    /// 每次调用计入的 (prompt, completion) token 数
    usage_per_call: Option<(u64, u64)>,
    usage: TokenUsage,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 无脚本的回显模式
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn with_plan(self, plan: &Plan) -> Self {
        self.with_structured("Plan", serde_json::to_value(plan).unwrap_or(Value::Null))
    }

    pub fn with_task_plan(self, task_plan: &TaskPlan) -> Self {
        self.with_structured("TaskPlan", serde_json::to_value(task_plan).unwrap_or(Value::Null))
    }

    /// 每次调用按固定数目累计 token
    pub fn with_usage_per_call(mut self, prompt: u64, completion: u64) -> Self {
        self.usage_per_call = Some((prompt, completion));
        self
    }

    fn record_usage(&self) {
        if let Some((prompt, completion)) = self.usage_per_call {
            self.usage.add(prompt, completion);
        }
    }

    /// 任意目标名的原始 JSON（可用于构造不合法输出）
    pub fn with_structured(self, target: &str, value: Value) -> Self {
        if let Ok(mut map) = self.structured.lock() {
            map.insert(target.to_string(), value);
        }
        self
    }

    /// 追加一轮事件
    pub fn with_turn(self, events: Vec<EngineEvent>) -> Self {
        if let Ok(mut turns) = self.turns.lock() {
            turns.push_back(events);
        }
        self
    }

    /// 便捷构造：一轮只包含一个工具调用
    pub fn with_tool_turn(self, name: &str, args: Value) -> Self {
        let id = format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed));
        self.with_turn(vec![EngineEvent::ToolCall(ToolInvocation::new(id, name, args))])
    }

    /// 已调用 stream_turn 的次数
    pub fn turns_served(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 第 n 次 stream_turn 收到的消息
    pub fn seen_messages(&self, n: usize) -> Option<Vec<Message>> {
        self.seen.lock().ok().and_then(|s| s.get(n).cloned())
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn echo_structured(&self, target: &str) -> Option<Value> {
        match target {
            "Plan" => Some(json!({
                "name": "echo project",
                "description": "Offline echo of the request",
                "techstack": "markdown",
                "files": [{"path": "README.md", "purpose": "Echo of the request"}],
            })),
            "TaskPlan" => Some(json!({
                "implementation_steps": [{
                    "filepath": "README.md",
                    "task_description": "Write the original request into README.md",
                }],
            })),
            _ => None,
        }
    }

    fn echo_turn(&self, messages: &[Message]) -> Vec<EngineEvent> {
        // 本步已写过则结束
        if messages.last().map(|m| m.role == Role::Tool).unwrap_or(false) {
            return vec![EngineEvent::TextDelta("README.md written.".to_string())];
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let id = format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed));
        vec![
            EngineEvent::TextDelta("Echoing the request.".to_string()),
            EngineEvent::ToolCall(ToolInvocation::new(
                id,
                "write_file",
                json!({"path": "README.md", "content": format!("# Echo\n\n{}\n", last_user)}),
            )),
        ]
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete_structured(
        &self,
        _instruction: &str,
        target: &StructuredTarget,
    ) -> Result<Option<Value>, LlmError> {
        self.record_usage();
        if self.echo {
            return Ok(self.echo_structured(&target.name));
        }
        let map = self
            .structured
            .lock()
            .map_err(|e| LlmError::Exhausted(e.to_string()))?;
        Ok(map.get(&target.name).cloned())
    }

    async fn stream_turn(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<EngineStream, LlmError> {
        self.record_usage();
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let events = if self.echo {
            self.echo_turn(messages)
        } else {
            self.turns
                .lock()
                .map_err(|e| LlmError::Exhausted(e.to_string()))?
                .pop_front()
                .unwrap_or_else(|| vec![EngineEvent::TextDelta("Done.".to_string())])
        };
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}
