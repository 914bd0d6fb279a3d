//! 会话监管：运行生命周期、中断管理
//!
//! 每次运行开始时签发新的 CancellationToken；用户 Ctrl+C 时取消当前运行，
//! 不影响之后的运行。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    /// 当前运行的取消令牌
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一次运行，返回其取消令牌
    pub fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(token.clone());
        }
        token
    }

    /// 运行结束
    pub fn end_run(&self) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = None;
        }
    }

    /// 取消当前运行；没有运行时返回 false
    pub fn cancel(&self) -> bool {
        match self.current.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_only_affects_current_run() {
        let sup = SessionSupervisor::new();
        assert!(!sup.cancel());

        let first = sup.begin_run();
        assert!(sup.is_running());
        assert!(sup.cancel());
        assert!(first.is_cancelled());
        sup.end_run();

        let second = sup.begin_run();
        assert!(!second.is_cancelled());
        sup.end_run();
        assert!(!sup.is_running());
    }
}
