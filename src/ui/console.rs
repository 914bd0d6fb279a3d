//! 终端展示：把 ProgressEvent 渲染成行文本
//!
//! 渲染与输出分离：`render` 只产出字符串（便于测试），`print_event` 写 stdout。

use std::io::Write;

use crate::core::{ProgressEvent, RunReport};

/// 单条引擎文本在终端显示的最大字符数
const MAX_TEXT_DISPLAY_CHARS: usize = 600;

/// 过长内容折叠：保留前 N 字 + 省略提示
fn truncate_for_display(content: &str, limit: usize) -> String {
    let total = content.chars().count();
    if total <= limit {
        return content.to_string();
    }
    let head: String = content.chars().take(limit).collect();
    format!("{head}\n... [truncated, {total} chars]")
}

/// 把一个事件渲染为要输出的文本；AssistantText 不换行，其余各自成行
pub fn render(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::StageStarted { stage } => format!("==> {stage}\n"),
        ProgressEvent::PlanReady {
            name,
            description,
            techstack,
            project_dir,
            files,
        } => {
            let mut out = format!(
                "Project: {name}\n  {description}\n  Tech stack: {techstack}\n  Directory: {project_dir}\n"
            );
            if !files.is_empty() {
                out.push_str(&format!("  Files ({}):\n", files.len()));
                for f in files {
                    out.push_str(&format!("    - {f}\n"));
                }
            }
            out
        }
        ProgressEvent::TaskPlanReady { steps } => {
            let mut out = format!("Task plan: {} steps\n", steps.len());
            for (i, s) in steps.iter().enumerate() {
                out.push_str(&format!("  {}. {} - {}\n", i + 1, s.filepath, s.summary));
            }
            out
        }
        ProgressEvent::StepStarted {
            index,
            total,
            filepath,
            existing_file,
        } => {
            let mode = if *existing_file { "update" } else { "create" };
            format!("\n[{index}/{total}] {filepath} ({mode})\n")
        }
        ProgressEvent::AssistantText { text } => truncate_for_display(text, MAX_TEXT_DISPLAY_CHARS),
        ProgressEvent::ToolCall { description, .. } => format!("\n  > {description}\n"),
        ProgressEvent::ToolResult { tool, ok, preview } => {
            if *ok {
                format!("  < {tool} ok\n")
            } else {
                format!("  < {tool} failed: {preview}\n")
            }
        }
        ProgressEvent::StepCompleted { index, total, .. } => {
            format!("\n  step {index}/{total} done\n")
        }
        ProgressEvent::RunFinished { status, reason, .. } => match reason {
            Some(r) => format!("\nRun {status}: {r}\n"),
            None => format!("\nRun {status}\n"),
        },
    }
}

pub fn print_event(event: &ProgressEvent) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{}", render(event));
    let _ = stdout.flush();
}

/// 运行结束后的摘要：生成的文件列表
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    if let Some(dir) = &report.project_dir {
        out.push_str(&format!("Project directory: {}\n", dir.display()));
    }
    if report.token_usage.total > 0 {
        out.push_str(&format!(
            "Tokens: {} (prompt {}, completion {})\n",
            report.token_usage.total, report.token_usage.prompt, report.token_usage.completion
        ));
    }
    if report.files_written.is_empty() {
        out.push_str("No files written.\n");
    } else {
        out.push_str("Files written:\n");
        for f in &report.files_written {
            out.push_str(&format!("  {f}\n"));
        }
    }
    out
}
