//! 记忆层：跨步骤共享的对话历史与窗口策略

pub mod conversation;

pub use conversation::{ConversationHistory, HistoryWindow, Message, Role, ToolInvocation};
