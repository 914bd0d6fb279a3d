//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BUILDBEE__*` 覆盖（双下划线表示嵌套，如 `BUILDBEE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::tools::DEFAULT_DENY_PATTERNS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub history: HistorySection,
    pub coder: CoderSection,
}

/// [app] 段：项目目录创建位置、Coder 步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 项目目录的父目录，未设置时用当前目录
    pub base_dir: Option<PathBuf>,
    pub step_ceiling: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            base_dir: None,
            step_ceiling: 100,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            request_timeout_secs: 120,
            temperature: None,
        }
    }
}

/// [tools] 段：命令超时、输出截断、拒绝模式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// run_command 未指定 timeout 时的默认值（秒）
    pub command_timeout_secs: u64,
    /// 引擎可请求的最大 timeout（秒）
    pub max_command_timeout_secs: u64,
    pub max_output_chars: usize,
    /// 命中即拒绝执行的命令片段
    pub deny_patterns: Vec<String>,
    /// 引擎请求的路径越界是否直接终止运行（默认作为工具失败回传）
    pub abort_on_path_escape: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            max_command_timeout_secs: 600,
            max_output_chars: 20_000,
            deny_patterns: DEFAULT_DENY_PATTERNS.iter().map(|s| s.to_string()).collect(),
            abort_on_path_escape: false,
        }
    }
}

/// [history] 段：发给引擎的对话视图保留多少条消息（不设则全部）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HistorySection {
    pub max_messages: Option<usize>,
}

/// [coder] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoderSection {
    pub max_turns_per_step: usize,
}

impl Default for CoderSection {
    fn default() -> Self {
        Self {
            max_turns_per_step: crate::stages::DEFAULT_MAX_TURNS_PER_STEP,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BUILDBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BUILDBEE__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    let mut found = false;
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            found = true;
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
            found = true;
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }
    if !found {
        tracing::warn!("no config file found, using defaults");
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BUILDBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
