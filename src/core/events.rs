//! 运行过程事件：供终端、日志或 API 等任意订阅方展示规划、步骤、工具调用与最终状态

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 任务列表中单步的摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub filepath: String,
    pub summary: String,
}

/// 一次运行消耗的 token（由引擎累计值前后相减得到）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCount {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenCount {
    pub fn between(before: (u64, u64, u64), after: (u64, u64, u64)) -> Self {
        Self {
            prompt: after.0.saturating_sub(before.0),
            completion: after.1.saturating_sub(before.1),
            total: after.2.saturating_sub(before.2),
        }
    }
}

/// 单个过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 进入新阶段
    StageStarted { stage: String },
    /// 计划已产生，项目目录已建立
    PlanReady {
        name: String,
        description: String,
        techstack: String,
        project_dir: String,
        files: Vec<String>,
    },
    /// 任务拆解完成
    TaskPlanReady { steps: Vec<StepSummary> },
    /// 开始第 index 步（从 1 计）
    StepStarted {
        index: usize,
        total: usize,
        filepath: String,
        existing_file: bool,
    },
    /// 引擎文本（仅展示）
    AssistantText { text: String },
    /// 引擎请求的工具调用
    ToolCall { tool: String, description: String },
    /// 工具结果（预览，避免过长）
    ToolResult {
        tool: String,
        ok: bool,
        preview: String,
    },
    StepCompleted {
        index: usize,
        total: usize,
        filepath: String,
    },
    /// 运行结束
    RunFinished {
        status: String,
        reason: Option<String>,
        tokens: TokenCount,
    },
}

/// 事件发送端；未订阅时静默丢弃
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl Notifier {
    pub fn new(tx: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self { tx }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn send(&self, ev: ProgressEvent) {
        if let Some(t) = &self.tx {
            let _ = t.send(ev);
        }
    }
}

/// 截取前 max 个字符作为预览
pub fn preview(text: &str, max: usize) -> String {
    let head: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        format!("{head}...")
    } else {
        head
    }
}
