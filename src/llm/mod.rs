//! LLM 层：推理引擎适配边界与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use structured::{request_structured, target_for};
pub use traits::{EngineEvent, EngineStream, LlmClient, LlmError, StructuredTarget};
