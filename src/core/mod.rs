//! 核心编排层：错误与恢复、运行状态、进度事件、会话监管、阶段状态机

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use events::{Notifier, ProgressEvent, StepSummary, TokenCount};
pub use orchestrator::{
    create_llm_from_config, AbortReason, Orchestrator, RunOptions, RunReport, RunSession,
};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{
    CoderProgress, FileSpec, ImplementationStep, Plan, RunState, RunStatus, Stage, TaskPlan,
};
