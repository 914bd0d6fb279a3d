//! Planner：用户需求 -> Plan（结构化输出，失败即终止，不重试）

use crate::core::{AgentError, Plan};
use crate::llm::{request_structured, target_for, LlmClient};
use crate::stages::prompts::planner_prompt;

pub async fn plan_project(llm: &dyn LlmClient, user_prompt: &str) -> Result<Plan, AgentError> {
    let target = target_for::<Plan>("Plan", "A complete engineering project plan");
    let plan: Plan = request_structured(llm, &planner_prompt(user_prompt), &target)
        .await
        .map_err(|e| AgentError::PlanningFailed(e.to_string()))?;
    tracing::info!(name = %plan.name, files = plan.files.len(), "plan ready");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_missing_plan_fails() {
        let llm = ScriptedLlmClient::new();
        assert!(matches!(
            plan_project(&llm, "anything").await,
            Err(AgentError::PlanningFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_plan_fails() {
        let llm = ScriptedLlmClient::new()
            .with_structured("Plan", serde_json::json!({"description": "no name"}));
        assert!(matches!(
            plan_project(&llm, "anything").await,
            Err(AgentError::PlanningFailed(_))
        ));
    }
}
