//! 工具调用 JSON Schema 生成（schemars 自动生成工具参数 Schema）
//!
//! 参数结构体既用于生成告知引擎的 Schema，也用于分发时反序列化，两者不会不一致。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_FILES: &str = "list_files";
pub const GET_CURRENT_DIRECTORY: &str = "get_current_directory";
pub const RUN_COMMAND: &str = "run_command";

/// 读取文件；不存在时返回空字符串
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// 相对项目根目录的路径
    pub path: String,
}

/// 写入完整文件内容（覆盖）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// 相对项目根目录的路径
    pub path: String,
    /// 完整文件内容
    pub content: String,
}

fn default_directory() -> String {
    ".".to_string()
}

/// 递归列出目录下的文件
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// 相对项目根目录的目录，默认 "."
    #[serde(default = "default_directory")]
    pub directory: String,
}

/// 无参数
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetCurrentDirectoryArgs {}

/// 在项目目录中执行 shell 命令
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunCommandArgs {
    /// 要执行的命令
    pub cmd: String,
    /// 工作目录（相对项目根目录），默认项目根目录
    #[serde(default)]
    pub cwd: Option<String>,
    /// 超时秒数，默认 30
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// 告知引擎的工具定义
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// 生成内联（无 $ref）的参数 Schema，便于 function calling 直接使用
pub fn inline_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.remove("description");
        obj.remove("definitions");
    }
    value
}

/// Coder 可用的全部工具
pub fn coder_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: READ_FILE,
            description: "Read a file inside the project. Returns an empty string if the file does not exist.",
            parameters: inline_schema::<ReadFileArgs>(),
        },
        ToolSpec {
            name: WRITE_FILE,
            description: "Write the FULL content of a file inside the project, creating parent directories.",
            parameters: inline_schema::<WriteFileArgs>(),
        },
        ToolSpec {
            name: LIST_FILES,
            description: "Recursively list files under a project directory (default '.'), relative to the project root.",
            parameters: inline_schema::<ListFilesArgs>(),
        },
        ToolSpec {
            name: GET_CURRENT_DIRECTORY,
            description: "Return the absolute path of the project root.",
            parameters: inline_schema::<GetCurrentDirectoryArgs>(),
        },
        ToolSpec {
            name: RUN_COMMAND,
            description: "Run a shell command in the project (or a subdirectory). Returns exit_code, stdout and stderr.",
            parameters: inline_schema::<RunCommandArgs>(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_cover_the_five_tools() {
        let names: Vec<_> = coder_tool_specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![READ_FILE, WRITE_FILE, LIST_FILES, GET_CURRENT_DIRECTORY, RUN_COMMAND]
        );
    }

    #[test]
    fn test_write_file_schema_requires_path_and_content() {
        let schema = inline_schema::<WriteFileArgs>();
        let required: Vec<_> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"path"));
        assert!(required.contains(&"content"));
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_run_command_optional_fields() {
        let schema = inline_schema::<RunCommandArgs>();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "cmd");
        assert!(schema["properties"].get("timeout").is_some());
    }
}
