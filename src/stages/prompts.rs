//! 各阶段的指令文本

use crate::core::ImplementationStep;

pub fn planner_prompt(user_prompt: &str) -> String {
    format!(
        "You are the PLANNER. Turn the request below into a complete engineering project plan: \
         a short project name, a one-line description, the tech stack, and every file the \
         project needs with its purpose.\n\nUser request:\n{user_prompt}\n"
    )
}

pub fn architect_prompt(plan_json: &str) -> String {
    format!(
        "You are the ARCHITECT. Break the project plan below into ordered implementation steps.\n\n\
         Rules:\n\
         - Every file in the plan gets one or more steps.\n\
         - Each step names exactly what to implement: variables, functions, classes, components.\n\
         - Each step states how it depends on or is used by earlier steps \
           (imports, signatures, data flow).\n\
         - Order steps so dependencies come first.\n\
         - Each step is self-contained but carries forward the context it needs.\n\n\
         Project plan:\n{plan_json}\n"
    )
}

pub fn coder_system_prompt() -> String {
    "You are the CODER implementing one step of a multi-step project.\n\
     You can read, write and list files inside the project directory and run shell commands there.\n\n\
     Always:\n\
     - Before writing, call list_files and read_file on related files (e.g. index.html, styles.css, app.js).\n\
     - Keep IDs, classes and function names consistent across files.\n\
     - Do not add frameworks unless the request asks for them.\n\
     - Write the FULL file content with write_file(path, content).\n"
        .to_string()
}

/// 单步指令：原始需求、步骤描述、目标文件及其现有内容
pub fn step_prompt(user_prompt: &str, step: &ImplementationStep, existing_content: &str) -> String {
    format!(
        "Original request:\n{user_prompt}\n\n\
         Current task:\n{}\n\
         File: {}\n\n\
         Existing content:\n{existing_content}\n\n\
         Before writing, read any related files to keep selectors and functions consistent.\n\
         Use write_file(path, content) to save changes.",
        step.task_description, step.filepath
    )
}
