//! 终端界面：进度事件渲染与行式命令解析

pub mod console;
pub mod repl;

pub use console::{print_event, render, render_report};
pub use repl::{parse_line, ReplCommand, HELP_TEXT};
