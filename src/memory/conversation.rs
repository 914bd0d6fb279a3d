//! 对话历史：跨所有 Coder 步骤共享的有序日志
//!
//! 存储只追加、不截断；HistoryWindow 只决定发给引擎的「视图」，不修改存储本身。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
    /// 工具结果
    Tool,
}

/// 引擎发起的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Assistant 消息携带的工具调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    /// Tool 消息对应的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool 消息对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Assistant 文本 + 工具调用
    pub fn assistant_with_tools(content: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolInvocation, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 发给引擎的窗口策略；max_messages 为 None 时不限制
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    pub max_messages: Option<usize>,
}

impl HistoryWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn last(max_messages: usize) -> Self {
        Self {
            max_messages: Some(max_messages),
        }
    }
}

/// 只追加的对话日志
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 按窗口策略取发给引擎的视图：保留开头的 system 消息、最后一条 user 指令与最新的若干条；
    /// 窗口不会以失去对应调用的 Tool 结果开头
    pub fn window(&self, policy: &HistoryWindow) -> Vec<Message> {
        let len = self.messages.len();
        let max = match policy.max_messages {
            Some(max) if len > max => max,
            _ => return self.messages.clone(),
        };

        let head = self
            .messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .count();
        let budget = max.saturating_sub(head);
        let mut start = len.saturating_sub(budget).max(head);

        // 当前步骤的指令落在窗口外时单独保留，尾部让出一条
        let pinned = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .filter(|&i| i >= head && i < start);
        if let Some(idx) = pinned {
            start = len.saturating_sub(budget.saturating_sub(1)).max(idx + 1);
        }
        while start < len && self.messages[start].role == Role::Tool {
            start += 1;
        }

        let mut view = Vec::with_capacity(head + 1 + len - start);
        view.extend_from_slice(&self.messages[..head]);
        if let Some(idx) = pinned {
            view.push(self.messages[idx].clone());
        }
        view.extend_from_slice(&self.messages[start..]);
        view
    }
}
