//! 结构化输出：按类型生成 Schema 发给引擎，并把返回的 JSON 严格反序列化为目标类型
//!
//! 无结果、反序列化失败、传输失败统一为 StructuredOutput，不接受部分结果。

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::core::AgentError;
use crate::llm::{LlmClient, StructuredTarget};
use crate::tools::inline_schema;

pub fn target_for<T: JsonSchema>(name: &str, description: &str) -> StructuredTarget {
    StructuredTarget {
        name: name.to_string(),
        description: description.to_string(),
        schema: inline_schema::<T>(),
    }
}

/// 请求类型为 T 的结构化结果
pub async fn request_structured<T>(
    llm: &dyn LlmClient,
    instruction: &str,
    target: &StructuredTarget,
) -> Result<T, AgentError>
where
    T: DeserializeOwned + JsonSchema,
{
    let value = llm
        .complete_structured(instruction, target)
        .await
        .map_err(|e| AgentError::StructuredOutput(e.to_string()))?
        .ok_or_else(|| AgentError::StructuredOutput(format!("no {} returned", target.name)))?;

    serde_json::from_value(value)
        .map_err(|e| AgentError::StructuredOutput(format!("invalid {}: {}", target.name, e)))
}
