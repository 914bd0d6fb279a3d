//! 沙箱文件系统工具
//!
//! SafeFs 基于 Sandbox：所有路径经 resolve 校验必须在项目根目录下；
//! 写入先落到同目录临时文件再 rename，读者不会看到写了一半的内容。

use std::path::Path;

use walkdir::WalkDir;

use crate::core::AgentError;
use crate::tools::Sandbox;

/// 沙箱文件系统：read / write / list / 当前目录
#[derive(Debug, Clone)]
pub struct SafeFs {
    sandbox: Sandbox,
}

fn io_err(path: &Path, e: std::io::Error) -> AgentError {
    AgentError::Io(format!("{}: {}", path.display(), e))
}

impl SafeFs {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// 读取文件；不存在时返回空字符串（调用方据此判断「新文件」）
    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.sandbox.resolve(path)?;
        if !resolved.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&resolved).map_err(|e| io_err(&resolved, e))
    }

    /// 整体覆盖写入，自动创建父目录；返回 `WROTE:<绝对路径>`
    pub fn write_file(&self, path: &str, content: &str) -> Result<String, AgentError> {
        let resolved = self.sandbox.resolve(path)?;
        if resolved.is_dir() {
            return Err(AgentError::Io(format!(
                "{}: is a directory",
                resolved.display()
            )));
        }
        let parent = resolved
            .parent()
            .ok_or_else(|| AgentError::Io(format!("{}: no parent", resolved.display())))?;
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &resolved) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&resolved, e));
        }

        tracing::debug!(path = %resolved.display(), bytes = content.len(), "file written");
        Ok(format!("WROTE:{}", resolved.display()))
    }

    /// 递归列出目录下的普通文件，路径相对项目根目录，排序后返回
    pub fn list_files(&self, directory: &str) -> Result<Vec<String>, AgentError> {
        let base = self.sandbox.resolve(directory)?;
        if !base.is_dir() {
            return Err(AgentError::NotADirectory(directory.to_string()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(|e| AgentError::Io(e.to_string()))?;
            if entry.file_type().is_file() {
                files.push(self.sandbox.relative(entry.path())?);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn get_current_directory(&self) -> Result<String, AgentError> {
        Ok(self.sandbox.root()?.display().to_string())
    }
}
