//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：工具层失败回传给引擎，编排层/结构化输出失败终止运行。

use crate::core::{AgentError, RecoveryAction};

/// 错误传播策略：沙箱越界默认按工具失败处理，可配置为直接终止运行
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine {
    abort_on_path_escape: bool,
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 引擎请求的越界路径是否终止整个运行（默认 false：作为工具结果回传）
    pub fn with_abort_on_path_escape(mut self, abort: bool) -> Self {
        self.abort_on_path_escape = abort;
        self
    }

    /// 对工具调用中产生的错误给出处理方式
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::PathEscape(_) if self.abort_on_path_escape => RecoveryAction::AbortRun,
            AgentError::PathEscape(_)
            | AgentError::NotADirectory(_)
            | AgentError::CommandTimeout { .. }
            | AgentError::CommandRejected(_)
            | AgentError::UnsupportedTool(_)
            | AgentError::InvalidToolArgs { .. }
            | AgentError::Io(_) => RecoveryAction::ReportToEngine,
            // 根目录未建立说明编排顺序有缺陷，不能交给引擎处理
            AgentError::RootNotInitialized | AgentError::RootAlreadyBound(_) => {
                RecoveryAction::AbortRun
            }
            _ => RecoveryAction::AbortRun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_tool_failures_reported() {
        let engine = RecoveryEngine::new();
        for err in [
            AgentError::NotADirectory("src".to_string()),
            AgentError::Io("permission denied".to_string()),
            AgentError::UnsupportedTool("delete_everything".to_string()),
            AgentError::CommandTimeout {
                cmd: "sleep 60".to_string(),
                timeout_secs: 1,
            },
        ] {
            assert_eq!(engine.handle(&err), RecoveryAction::ReportToEngine, "{err}");
        }
    }

    #[test]
    fn test_recovery_path_escape_policy() {
        let err = AgentError::PathEscape("../../etc/passwd".to_string());
        assert_eq!(RecoveryEngine::new().handle(&err), RecoveryAction::ReportToEngine);
        let strict = RecoveryEngine::new().with_abort_on_path_escape(true);
        assert_eq!(strict.handle(&err), RecoveryAction::AbortRun);
    }

    #[test]
    fn test_recovery_root_not_initialized_aborts() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&AgentError::RootNotInitialized),
            RecoveryAction::AbortRun
        );
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::AbortRun);
    }
}
