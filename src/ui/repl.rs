//! 行式交互：解析用户输入（斜杠命令或需求文本）

/// 一行输入对应的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// 以该需求启动一次运行
    Run(String),
    Help,
    Clear,
    Exit,
    /// 空行
    Empty,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
Describe the project you want to build and press Enter.
Commands:
  /help          show this help
  /clear, /c     clear the screen
  /exit, /quit   leave (also /q)
Press Ctrl+C during a run to cancel it.";

pub fn parse_line(line: &str) -> ReplCommand {
    let input = line.trim();
    if input.is_empty() {
        return ReplCommand::Empty;
    }
    if !input.starts_with('/') {
        return ReplCommand::Run(input.to_string());
    }
    let cmd = input.split_whitespace().next().unwrap_or(input);
    match cmd.to_lowercase().as_str() {
        "/help" | "/h" | "/?" => ReplCommand::Help,
        "/clear" | "/c" => ReplCommand::Clear,
        "/exit" | "/quit" | "/q" => ReplCommand::Exit,
        _ => ReplCommand::Unknown(cmd.to_string()),
    }
}
