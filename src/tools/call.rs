//! 工具调用的封闭枚举
//!
//! 引擎给出的 (name, args) 在这里一次性解析为五种已知操作之一；未知名称得到 UnsupportedTool，
//! 参数不合法得到 InvalidToolArgs，二者都作为工具结果回传给引擎。

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::{
    GetCurrentDirectoryArgs, ListFilesArgs, ReadFileArgs, RunCommandArgs, WriteFileArgs,
    GET_CURRENT_DIRECTORY, LIST_FILES, READ_FILE, RUN_COMMAND, WRITE_FILE,
};

/// 描述最多展示的字符数
const DESCRIBE_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListFiles { directory: String },
    GetCurrentDirectory,
    RunCommand {
        cmd: String,
        cwd: Option<String>,
        timeout_secs: Option<u64>,
    },
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, AgentError> {
    // 无参数工具常被给成 null
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        // 部分后端把参数作为 JSON 字符串给出
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| AgentError::InvalidToolArgs {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?,
        other => other.clone(),
    };
    serde_json::from_value(args).map_err(|e| AgentError::InvalidToolArgs {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

impl ToolCall {
    pub fn parse(name: &str, args: &Value) -> Result<Self, AgentError> {
        match name {
            READ_FILE => {
                let a: ReadFileArgs = parse_args(name, args)?;
                Ok(ToolCall::ReadFile { path: a.path })
            }
            WRITE_FILE => {
                let a: WriteFileArgs = parse_args(name, args)?;
                Ok(ToolCall::WriteFile {
                    path: a.path,
                    content: a.content,
                })
            }
            LIST_FILES => {
                let a: ListFilesArgs = parse_args(name, args)?;
                Ok(ToolCall::ListFiles {
                    directory: a.directory,
                })
            }
            GET_CURRENT_DIRECTORY => {
                let _: GetCurrentDirectoryArgs = parse_args(name, args)?;
                Ok(ToolCall::GetCurrentDirectory)
            }
            RUN_COMMAND => {
                let a: RunCommandArgs = parse_args(name, args)?;
                Ok(ToolCall::RunCommand {
                    cmd: a.cmd,
                    cwd: a.cwd,
                    timeout_secs: a.timeout,
                })
            }
            other => Err(AgentError::UnsupportedTool(other.to_string())),
        }
    }

    /// 给展示层用的一行描述
    pub fn describe(&self) -> String {
        match self {
            ToolCall::ReadFile { path } => format!("Reading: {path}"),
            ToolCall::WriteFile { path, content } => {
                format!("Writing: {path} ({} bytes)", content.len())
            }
            ToolCall::ListFiles { directory } => format!("Listing: {directory}"),
            ToolCall::GetCurrentDirectory => "Getting project directory".to_string(),
            ToolCall::RunCommand { cmd, .. } => {
                let short: String = cmd.chars().take(DESCRIBE_CHARS).collect();
                if cmd.chars().count() > DESCRIBE_CHARS {
                    format!("Running: {short}...")
                } else {
                    format!("Running: {short}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_tools() {
        assert_eq!(
            ToolCall::parse("write_file", &json!({"path": "a.txt", "content": "x"})).unwrap(),
            ToolCall::WriteFile {
                path: "a.txt".into(),
                content: "x".into()
            }
        );
        assert_eq!(
            ToolCall::parse("list_files", &json!({})).unwrap(),
            ToolCall::ListFiles {
                directory: ".".into()
            }
        );
        assert_eq!(
            ToolCall::parse("get_current_directory", &Value::Null).unwrap(),
            ToolCall::GetCurrentDirectory
        );
        assert_eq!(
            ToolCall::parse("run_command", &json!({"cmd": "ls", "timeout": 5})).unwrap(),
            ToolCall::RunCommand {
                cmd: "ls".into(),
                cwd: None,
                timeout_secs: Some(5)
            }
        );
    }

    #[test]
    fn test_parse_stringified_args() {
        let call = ToolCall::parse("read_file", &json!("{\"path\": \"index.html\"}")).unwrap();
        assert_eq!(
            call,
            ToolCall::ReadFile {
                path: "index.html".into()
            }
        );
    }

    #[test]
    fn test_unknown_tool_is_unsupported() {
        assert!(matches!(
            ToolCall::parse("run_cmd", &json!({"cmd": "ls"})),
            Err(AgentError::UnsupportedTool(name)) if name == "run_cmd"
        ));
    }

    #[test]
    fn test_missing_argument_is_invalid() {
        assert!(matches!(
            ToolCall::parse("write_file", &json!({"path": "a.txt"})),
            Err(AgentError::InvalidToolArgs { tool, .. }) if tool == "write_file"
        ));
    }

    #[test]
    fn test_describe_truncates_long_commands() {
        let cmd = "echo ".repeat(30);
        let call = ToolCall::parse("run_command", &json!({ "cmd": cmd })).unwrap();
        assert!(call.describe().ends_with("..."));
    }
}
