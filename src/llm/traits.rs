//! LLM 客户端抽象（推理引擎适配边界）
//!
//! 两种调用形态：complete_structured（按目标 Schema 返回结构化对象）、
//! stream_turn（带工具定义的一轮对话，返回文本增量与工具调用事件流）。
//! 适配器本身不执行任何工具，只宣布意图；执行与回写由 Coder 负责。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::memory::{Message, ToolInvocation};
use crate::tools::ToolSpec;

/// 引擎调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(String),

    /// 脚本化客户端没有更多预设回复等
    #[error("Engine exhausted: {0}")]
    Exhausted(String),
}

/// 一轮对话中的事件（按到达顺序）
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// 文本增量，仅用于展示
    TextDelta(String),
    /// 引擎请求调用工具
    ToolCall(ToolInvocation),
}

pub type EngineStream = Pin<Box<dyn Stream<Item = Result<EngineEvent, LlmError>> + Send>>;

/// 结构化输出目标：名称（如 Plan）、描述与 JSON Schema
#[derive(Debug, Clone)]
pub struct StructuredTarget {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 结构化调用：返回目标 Schema 的 JSON 实例；引擎没有给出结果时返回 Ok(None)
    async fn complete_structured(
        &self,
        instruction: &str,
        target: &StructuredTarget,
    ) -> Result<Option<Value>, LlmError>;

    /// 带工具的一轮对话：事件流在引擎结束本轮输出时终止
    async fn stream_turn(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<EngineStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
