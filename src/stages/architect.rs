//! Architect：Plan -> TaskPlan；步骤顺序原样保留，不重排、不去重

use crate::core::{AgentError, Plan, TaskPlan};
use crate::llm::{request_structured, target_for, LlmClient};
use crate::stages::prompts::architect_prompt;

pub async fn architect(llm: &dyn LlmClient, plan: &Plan) -> Result<TaskPlan, AgentError> {
    let plan_json =
        serde_json::to_string(plan).map_err(|e| AgentError::ArchitectingFailed(e.to_string()))?;
    let target = target_for::<TaskPlan>("TaskPlan", "Ordered implementation steps for the plan");
    let task_plan: TaskPlan = request_structured(llm, &architect_prompt(&plan_json), &target)
        .await
        .map_err(|e| AgentError::ArchitectingFailed(e.to_string()))?;
    tracing::info!(steps = task_plan.len(), "task plan ready");
    Ok(task_plan)
}
