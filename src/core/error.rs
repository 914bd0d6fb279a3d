//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 ReportToEngine（作为工具结果回传引擎）还是 AbortRun。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// 一次运行中可能出现的错误（沙箱越界、工具失败、结构化输出失败、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Path escapes project root: {0}")]
    PathEscape(String),

    #[error("Project root not initialized; the plan must be produced before any tool runs")]
    RootNotInitialized,

    /// 同一次运行内试图把根目录绑定到另一个位置
    #[error("Project root already bound to {0}")]
    RootAlreadyBound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Command timed out after {timeout_secs}s: {cmd}")]
    CommandTimeout { cmd: String, timeout_secs: u64 },

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Unsupported tool: {0}")]
    UnsupportedTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidToolArgs { tool: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    #[error("Planner did not return a valid plan: {0}")]
    PlanningFailed(String),

    #[error("Architect did not return a valid task plan: {0}")]
    ArchitectingFailed(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    /// 单步内引擎持续调用工具不收敛
    #[error("Step {step} exceeded {max_turns} engine turns")]
    TurnLimitExceeded { step: usize, max_turns: usize },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 作为失败的工具结果写回对话，引擎自行调整下一步
    ReportToEngine,
    /// 终止整个运行
    AbortRun,
}
