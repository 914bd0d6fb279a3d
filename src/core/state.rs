//! 运行状态：Plan / TaskPlan / CoderProgress / RunState
//!
//! Plan 与 TaskPlan 由结构化输出一次性产生后不可变；CoderProgress 只前进不后退。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::memory::ConversationHistory;

/// 计划中的单个文件
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileSpec {
    /// 相对项目根目录的路径，如 index.html
    pub path: String,
    /// 该文件的用途
    #[serde(default)]
    pub purpose: String,
}

/// 项目计划（Planner 输出）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// 项目名，同时决定项目目录名
    pub name: String,
    /// 一句话描述
    #[serde(default)]
    pub description: String,
    /// 技术栈，如 "html, css, javascript"
    #[serde(default)]
    pub techstack: String,
    /// 需要创建的文件，按顺序
    #[serde(default)]
    pub files: Vec<FileSpec>,
}

/// 单个实现步骤
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImplementationStep {
    /// 本步骤要写的文件
    pub filepath: String,
    /// 具体要实现的内容
    pub task_description: String,
}

/// 任务拆解（Architect 输出），顺序即执行顺序
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskPlan {
    pub implementation_steps: Vec<ImplementationStep>,
}

impl TaskPlan {
    pub fn len(&self) -> usize {
        self.implementation_steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.implementation_steps.is_empty()
    }
}

/// Coder 进度：current_step_idx 每完成一步恰好加一
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoderProgress {
    task_plan: TaskPlan,
    current_step_idx: usize,
}

impl CoderProgress {
    pub fn new(task_plan: TaskPlan) -> Self {
        Self {
            task_plan,
            current_step_idx: 0,
        }
    }

    pub fn current_step_idx(&self) -> usize {
        self.current_step_idx
    }

    pub fn total_steps(&self) -> usize {
        self.task_plan.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.current_step_idx >= self.task_plan.len()
    }

    /// 当前待执行的步骤；已全部完成时为 None
    pub fn current_step(&self) -> Option<&ImplementationStep> {
        self.task_plan.implementation_steps.get(self.current_step_idx)
    }

    /// 完成当前步骤；终态下不再前进
    pub(crate) fn advance(&mut self) {
        if !self.is_terminal() {
            self.current_step_idx += 1;
        }
    }
}

/// 运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Done,
    /// 步数上限、取消或致命错误
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// 状态机阶段：PLANNING -> ARCHITECTING -> CODING(step) -> DONE，只向前
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Architecting,
    Coding { step: usize },
    Done,
}

/// 一次运行的共享状态；各字段随阶段完成单调填充
#[derive(Clone, Debug)]
pub struct RunState {
    pub user_prompt: String,
    pub plan: Option<Plan>,
    pub task_plan: Option<TaskPlan>,
    pub coder_progress: Option<CoderProgress>,
    pub conversation_history: ConversationHistory,
    pub status: RunStatus,
}

impl RunState {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            plan: None,
            task_plan: None,
            coder_progress: None,
            conversation_history: ConversationHistory::new(),
            status: RunStatus::Running,
        }
    }

    pub fn current_step_idx(&self) -> usize {
        self.coder_progress
            .as_ref()
            .map(CoderProgress::current_step_idx)
            .unwrap_or(0)
    }

    /// 仍有未执行的步骤
    pub fn has_pending_step(&self) -> bool {
        self.coder_progress
            .as_ref()
            .map(|p| !p.is_terminal())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_of(n: usize) -> TaskPlan {
        TaskPlan {
            implementation_steps: (0..n)
                .map(|i| ImplementationStep {
                    filepath: format!("file{i}.txt"),
                    task_description: format!("step {i}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_progress_advances_one_at_a_time() {
        let mut progress = CoderProgress::new(plan_of(2));
        assert_eq!(progress.current_step().unwrap().filepath, "file0.txt");
        progress.advance();
        assert_eq!(progress.current_step_idx(), 1);
        progress.advance();
        assert!(progress.is_terminal());
        progress.advance();
        assert_eq!(progress.current_step_idx(), 2);
        assert!(progress.current_step().is_none());
    }

    #[test]
    fn test_empty_task_plan_is_terminal() {
        let progress = CoderProgress::new(TaskPlan::default());
        assert!(progress.is_terminal());
    }

    #[test]
    fn test_plan_accepts_missing_optional_fields() {
        let plan: Plan = serde_json::from_value(serde_json::json!({
            "name": "hello world page",
            "files": [{"path": "index.html"}]
        }))
        .unwrap();
        assert_eq!(plan.files[0].path, "index.html");
        assert!(plan.techstack.is_empty());
    }
}
