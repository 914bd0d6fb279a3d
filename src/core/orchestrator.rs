//! 编排器：PLANNING -> ARCHITECTING -> CODING(step) -> DONE 状态机
//!
//! Orchestrator 持有引擎与运行参数；每次 run 创建独立的 RunSession（独立 ProjectContext、
//! ToolExecutor、对话历史），单线程顺序推进各阶段，直到 DONE、步数上限、取消或致命错误。

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::core::events::{StepSummary, TokenCount};
use crate::core::{
    AgentError, CoderProgress, Notifier, Plan, ProgressEvent, RecoveryEngine, RunState, RunStatus,
    Stage, TaskPlan,
};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, ScriptedLlmClient};
use crate::memory::HistoryWindow;
use crate::stages::{architect, plan_project, Coder, CoderOutcome, DEFAULT_MAX_TURNS_PER_STEP};
use crate::tools::{ProjectContext, SafeFs, Sandbox, ShellRunner, ToolExecutor, DEFAULT_DENY_PATTERNS};

/// 任务列表摘要的最大字符数
const STEP_SUMMARY_CHARS: usize = 60;

/// 按配置与环境变量选择推理引擎；没有 API Key 或 provider 为 mock 时退回离线回显引擎
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();
    // 有 DeepSeek Key，或配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = match provider.as_str() {
        "deepseek" => has_deepseek_key || has_openai_key,
        "openai" | "mock" => false,
        _ => has_deepseek_key,
    };
    let use_openai = provider == "openai" && has_openai_key;

    let client = if use_deepseek {
        let model = cfg.llm.model.clone();
        let client = create_deepseek_client(cfg.llm.base_url.as_deref(), model.as_deref());
        tracing::info!("Using DeepSeek LLM ({} at {})", client.model(), client.base_url());
        client
    } else if use_openai {
        let model = cfg
            .llm
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )
    } else {
        tracing::warn!("No API key set or provider is mock, using offline echo LLM");
        return Arc::new(ScriptedLlmClient::echo());
    };

    let client = client.with_timeout(cfg.llm.request_timeout_secs);
    match cfg.llm.temperature {
        Some(t) => Arc::new(client.with_temperature(t)),
        None => Arc::new(client),
    }
}

/// 运行参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 项目目录创建在此目录下
    pub base_dir: PathBuf,
    /// Coder 进入次数上限
    pub step_ceiling: usize,
    pub history_window: HistoryWindow,
    pub max_turns_per_step: usize,
    pub command_timeout_secs: u64,
    pub max_command_timeout_secs: u64,
    pub max_output_chars: usize,
    pub deny_patterns: Vec<String>,
    pub abort_on_path_escape: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            step_ceiling: 100,
            history_window: HistoryWindow::unbounded(),
            max_turns_per_step: DEFAULT_MAX_TURNS_PER_STEP,
            command_timeout_secs: 30,
            max_command_timeout_secs: 600,
            max_output_chars: 20_000,
            deny_patterns: DEFAULT_DENY_PATTERNS.iter().map(|s| s.to_string()).collect(),
            abort_on_path_escape: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let base_dir = cfg
            .app
            .base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            base_dir,
            step_ceiling: cfg.app.step_ceiling,
            history_window: HistoryWindow {
                max_messages: cfg.history.max_messages,
            },
            max_turns_per_step: cfg.coder.max_turns_per_step,
            command_timeout_secs: cfg.tools.command_timeout_secs,
            max_command_timeout_secs: cfg.tools.max_command_timeout_secs,
            max_output_chars: cfg.tools.max_output_chars,
            deny_patterns: cfg.tools.deny_patterns.clone(),
            abort_on_path_escape: cfg.tools.abort_on_path_escape,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}

/// 非 DONE 结束的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    StepCeiling {
        ceiling: usize,
        completed: usize,
        total: usize,
    },
    Cancelled,
    Failed { cause: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::StepCeiling {
                ceiling,
                completed,
                total,
            } => write!(
                f,
                "step ceiling {ceiling} reached after {completed}/{total} steps"
            ),
            AbortReason::Cancelled => f.write_str("cancelled by user"),
            AbortReason::Failed { cause } => f.write_str(cause),
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub plan: Option<Plan>,
    pub task_plan: Option<TaskPlan>,
    pub project_dir: Option<PathBuf>,
    pub files_written: Vec<String>,
    pub steps_completed: usize,
    pub abort_reason: Option<AbortReason>,
    pub token_usage: TokenCount,
}

/// 编排器
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    options: RunOptions,
    notifier: Notifier,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, options: RunOptions) -> Self {
        Self {
            llm,
            options,
            notifier: Notifier::silent(),
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.notifier = Notifier::new(Some(tx));
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// 创建一次运行（尚未开始推进）
    pub fn start(&self, user_prompt: &str) -> RunSession<'_> {
        let context = ProjectContext::new(&self.options.base_dir);
        let sandbox = Sandbox::new(context.clone());
        let shell = ShellRunner::new(sandbox.clone())
            .with_deny_patterns(self.options.deny_patterns.clone())
            .with_timeouts(
                self.options.command_timeout_secs,
                self.options.max_command_timeout_secs,
            )
            .with_max_output_chars(self.options.max_output_chars);
        let recovery =
            RecoveryEngine::new().with_abort_on_path_escape(self.options.abort_on_path_escape);
        let executor = ToolExecutor::new(SafeFs::new(sandbox), shell, recovery);
        let coder = Coder::new(self.llm.clone())
            .with_history_window(self.options.history_window)
            .with_max_turns(self.options.max_turns_per_step);

        RunSession {
            orchestrator: self,
            run_id: uuid::Uuid::new_v4().to_string(),
            state: RunState::new(user_prompt),
            context,
            executor,
            coder,
            stage: Stage::Planning,
            coder_iterations: 0,
            usage_at_start: self.llm.token_usage(),
        }
    }

    /// 运行入口：推进状态机直到 DONE、步数上限、取消或致命错误
    pub async fn run(
        &self,
        user_prompt: &str,
        step_ceiling: usize,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut session = self.start(user_prompt);
        let span = tracing::info_span!("run", run_id = %session.run_id);
        async move {
            let result = session.drive(step_ceiling, &cancel).await;
            let (status, reason) = match result {
                Ok(None) => (RunStatus::Done, None),
                Ok(Some(reason)) => (RunStatus::Aborted, Some(reason)),
                Err(AgentError::Cancelled) => (RunStatus::Aborted, Some(AbortReason::Cancelled)),
                Err(e) => (
                    RunStatus::Aborted,
                    Some(AbortReason::Failed {
                        cause: e.to_string(),
                    }),
                ),
            };
            match &reason {
                None => tracing::info!(%status, "run finished"),
                Some(r) => tracing::warn!(%status, reason = %r, "run aborted"),
            }
            let tokens = session.token_usage();
            tracing::info!(total_tokens = tokens.total, "token usage");
            self.notifier.send(ProgressEvent::RunFinished {
                status: status.to_string(),
                reason: reason.as_ref().map(ToString::to_string),
                tokens,
            });
            session.report(status, reason)
        }
        .instrument(span)
        .await
    }
}

/// 一次运行：独占 RunState、ProjectContext 与 ToolExecutor
pub struct RunSession<'o> {
    orchestrator: &'o Orchestrator,
    run_id: String,
    state: RunState,
    context: ProjectContext,
    executor: ToolExecutor,
    coder: Coder,
    stage: Stage,
    coder_iterations: usize,
    /// 开始时引擎的累计 token 数
    usage_at_start: (u64, u64, u64),
}

impl<'o> RunSession<'o> {
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 实际执行过的 Coder 步数
    pub fn coder_iterations(&self) -> usize {
        self.coder_iterations
    }

    pub fn files_written(&self) -> &[String] {
        self.executor.files_written()
    }

    /// 本次运行至今消耗的 token
    pub fn token_usage(&self) -> TokenCount {
        TokenCount::between(self.usage_at_start, self.orchestrator.llm.token_usage())
    }

    pub fn project_root(&self) -> Option<PathBuf> {
        self.context.root().ok().map(|p| p.to_path_buf())
    }

    /// 推进一次状态转移，返回转移后的阶段；DONE 后再调用不做任何事
    pub async fn advance(&mut self, cancel: &CancellationToken) -> Result<Stage, AgentError> {
        let orchestrator = self.orchestrator;
        let llm = orchestrator.llm.clone();
        let notifier = &orchestrator.notifier;
        match self.stage {
            Stage::Planning => {
                notifier.send(ProgressEvent::StageStarted {
                    stage: "planning".to_string(),
                });
                let plan = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    p = plan_project(llm.as_ref(), &self.state.user_prompt) => p?,
                };
                let root = self.context.ensure_root(&plan.name)?;
                notifier.send(ProgressEvent::PlanReady {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    techstack: plan.techstack.clone(),
                    project_dir: root.display().to_string(),
                    files: plan.files.iter().map(|f| f.path.clone()).collect(),
                });
                self.state.plan = Some(plan);
                self.stage = Stage::Architecting;
            }
            Stage::Architecting => {
                notifier.send(ProgressEvent::StageStarted {
                    stage: "architecting".to_string(),
                });
                let plan = self.state.plan.as_ref().ok_or_else(|| {
                    AgentError::ArchitectingFailed("architecting started without a plan".to_string())
                })?;
                let task_plan = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    t = architect(llm.as_ref(), plan) => t?,
                };
                notifier.send(ProgressEvent::TaskPlanReady {
                    steps: task_plan
                        .implementation_steps
                        .iter()
                        .map(|s| StepSummary {
                            filepath: s.filepath.clone(),
                            summary: crate::core::events::preview(
                                &s.task_description,
                                STEP_SUMMARY_CHARS,
                            ),
                        })
                        .collect(),
                });
                self.state.coder_progress = Some(CoderProgress::new(task_plan.clone()));
                self.state.task_plan = Some(task_plan);
                self.stage = Stage::Coding { step: 0 };
            }
            Stage::Coding { .. } => {
                let outcome = self
                    .coder
                    .step(&mut self.state, &mut self.executor, notifier, cancel)
                    .await?;
                if let CoderOutcome::Completed { .. } = outcome {
                    self.coder_iterations += 1;
                }
                self.stage = if self.state.status == RunStatus::Done {
                    Stage::Done
                } else {
                    Stage::Coding {
                        step: self.state.current_step_idx(),
                    }
                };
            }
            Stage::Done => {}
        }
        Ok(self.stage)
    }

    /// 推进直到结束；Ok(None) 表示 DONE，Ok(Some) 表示触发步数上限
    async fn drive(
        &mut self,
        step_ceiling: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<AbortReason>, AgentError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if matches!(self.stage, Stage::Coding { .. })
                && self.state.has_pending_step()
                && self.coder_iterations >= step_ceiling
            {
                let total = self
                    .state
                    .task_plan
                    .as_ref()
                    .map(TaskPlan::len)
                    .unwrap_or(0);
                return Ok(Some(AbortReason::StepCeiling {
                    ceiling: step_ceiling,
                    completed: self.state.current_step_idx(),
                    total,
                }));
            }
            if self.advance(cancel).await? == Stage::Done {
                return Ok(None);
            }
        }
    }

    pub fn report(&self, status: RunStatus, abort_reason: Option<AbortReason>) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            status,
            plan: self.state.plan.clone(),
            task_plan: self.state.task_plan.clone(),
            project_dir: self.project_root(),
            files_written: self.executor.files_written().to_vec(),
            steps_completed: self.state.current_step_idx(),
            abort_reason,
            token_usage: self.token_usage(),
        }
    }
}
