//! 工具层：项目沙箱、五个沙箱操作（read_file / write_file / list_files /
//! get_current_directory / run_command）与执行器

pub mod call;
pub mod executor;
pub mod filesystem;
pub mod sandbox;
pub mod schema;
pub mod shell;

pub use call::ToolCall;
pub use executor::{ToolExecutor, ToolOutcome};
pub use filesystem::SafeFs;
pub use sandbox::{project_slug, ProjectContext, Sandbox, DEFAULT_PROJECT_DIR};
pub use schema::{coder_tool_specs, inline_schema, ToolSpec};
pub use shell::{CommandOutput, ShellRunner, DEFAULT_DENY_PATTERNS};
