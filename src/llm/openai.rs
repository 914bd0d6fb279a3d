//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 直接调用任意 OpenAI 兼容端点的 /chat/completions（可配置 base_url）：
//! - 结构化输出：强制调用一个以目标 Schema 为参数的 function，取其 arguments；
//! - 工具对话：非流式请求，响应中的文本与 tool_calls 按顺序转成事件流。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{EngineEvent, EngineStream, LlmClient, LlmError, StructuredTarget};
use crate::memory::{Message, Role, ToolInvocation};
use crate::tools::ToolSpec;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature: 0.0,
            usage: TokenUsage::new(),
        }
    }

    /// 单次请求超时
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn message_to_openai(message: &Message) -> Value {
        match message.role {
            Role::System => json!({"role": "system", "content": message.content}),
            Role::User => json!({"role": "user", "content": message.content}),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.content,
            }),
            Role::Assistant if message.tool_calls.is_empty() => {
                json!({"role": "assistant", "content": message.content})
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.args.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if message.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(message.content.clone())
                };
                json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
            }
        }
    }

    fn tool_to_openai(name: &str, description: &str, parameters: &Value) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
            }
        })
    }

    async fn send(&self, body: Value) -> Result<ChatResponse, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::MissingApiKey(self.base_url.clone()))?;

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::Http { status, body: text });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete_structured(
        &self,
        instruction: &str,
        target: &StructuredTarget,
    ) -> Result<Option<Value>, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": instruction}],
            "tools": [Self::tool_to_openai(&target.name, &target.description, &target.schema)],
            "tool_choice": {"type": "function", "function": {"name": target.name}},
        });
        let response = self.send(body).await?;

        let call = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.tool_calls)
            .and_then(|calls| calls.into_iter().find(|c| c.function.name == target.name));

        match call {
            Some(call) => match serde_json::from_str::<Value>(&call.function.arguments) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(schema = %target.name, error = %e, "structured arguments are not JSON");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn stream_turn(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<EngineStream, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages.iter().map(Self::message_to_openai).collect::<Vec<_>>(),
            "tools": tools
                .iter()
                .map(|t| Self::tool_to_openai(t.name, t.description, &t.parameters))
                .collect::<Vec<_>>(),
        });
        let response = self.send(body).await?;

        let mut events = Vec::new();
        if let Some(message) = response.choices.into_iter().next().and_then(|c| c.message) {
            if let Some(text) = message.content.filter(|t| !t.is_empty()) {
                events.push(Ok(EngineEvent::TextDelta(text)));
            }
            for tc in message.tool_calls.unwrap_or_default() {
                // 参数不是合法 JSON 时原样保留字符串，由分发时报告 InvalidToolArgs
                let args = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments));
                events.push(Ok(EngineEvent::ToolCall(ToolInvocation::new(
                    tc.id,
                    tc.function.name,
                    args,
                ))));
            }
        }
        Ok(Box::pin(stream::iter(events)))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_tool_call_conversion() {
        let call = ToolInvocation::new("c1", "write_file", json!({"path": "a", "content": "b"}));
        let msg = OpenAiClient::message_to_openai(&Message::assistant_with_tools("", vec![call]));
        assert_eq!(msg["role"], "assistant");
        assert!(msg["content"].is_null());
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "write_file");
        let args: Value =
            serde_json::from_str(msg["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["path"], "a");
    }

    #[test]
    fn test_tool_result_conversion() {
        let call = ToolInvocation::new("c7", "read_file", json!({"path": "a"}));
        let msg = OpenAiClient::message_to_openai(&Message::tool_result(&call, "hello"));
        assert_eq!(msg["role"], "tool");
        assert_eq!(msg["tool_call_id"], "c7");
        assert_eq!(msg["content"], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "x", "type": "function", "function": {"name": "Plan", "arguments": "{\"name\":\"p\"}"}}
            ]}, "finish_reason": "tool_calls"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let calls = parsed.choices[0].message.as_ref().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "Plan");
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 10);
    }

    #[tokio::test]
    async fn test_missing_key_is_reported() {
        let mut client = OpenAiClient::new(Some("http://127.0.0.1:9"), "m", None);
        client.api_key = None;
        let err = client.stream_turn(&[], &[]).await.err().unwrap();
        assert!(matches!(err, LlmError::MissingApiKey(_)));
    }
}
