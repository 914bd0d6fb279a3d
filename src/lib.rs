//! BuildBee - 多阶段代码生成编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机编排、运行状态、错误与恢复、进度事件、会话监管
//! - **llm**: 推理引擎抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）
//! - **memory**: 对话历史与视图窗口
//! - **observability**: tracing 初始化
//! - **stages**: Planner、Architect、Coder 三个阶段
//! - **tools**: 沙箱与五个工具（读写文件、列目录、当前目录、执行命令）
//! - **ui**: 终端事件渲染与命令解析

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod stages;
pub mod tools;
pub mod ui;

pub use crate::core::{Orchestrator, RunOptions, RunReport, RunStatus};
