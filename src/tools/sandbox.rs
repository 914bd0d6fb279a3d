//! 项目沙箱
//!
//! ProjectContext 每次运行创建一次，Planner 产出计划后调用 ensure_root 绑定项目根目录（只绑定一次）；
//! Sandbox 的 resolve 先把 `..` 与符号链接规范化，再校验结果必须是根目录本身或其子路径。

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::AgentError;

/// 项目名清洗后为空时使用的目录名
pub const DEFAULT_PROJECT_DIR: &str = "project";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_-]").expect("static regex"))
}

fn repeated_dashes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-{2,}").expect("static regex"))
}

/// 项目名 -> 目录名：小写，非 [a-z0-9_-] 替换为 -，合并连续 -，去掉首尾 -
pub fn project_slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = unsafe_chars().replace_all(&lowered, "-");
    let collapsed = repeated_dashes().replace_all(&replaced, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        DEFAULT_PROJECT_DIR.to_string()
    } else {
        slug.to_string()
    }
}

/// 单次运行的项目上下文：base_dir 下的项目根目录，绑定后只读
#[derive(Debug, Clone)]
pub struct ProjectContext {
    base_dir: PathBuf,
    root: Arc<OnceLock<PathBuf>>,
}

impl ProjectContext {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            root: Arc::new(OnceLock::new()),
        }
    }

    /// 由项目名派生目录、创建（含父目录）并绑定为根目录；同名重复调用返回同一路径
    pub fn ensure_root(&self, name: &str) -> Result<PathBuf, AgentError> {
        let dir = self.base_dir.join(project_slug(name));
        std::fs::create_dir_all(&dir)
            .map_err(|e| AgentError::Io(format!("create {}: {}", dir.display(), e)))?;
        let dir = dir
            .canonicalize()
            .map_err(|e| AgentError::Io(format!("canonicalize {}: {}", dir.display(), e)))?;

        let bound = self.root.get_or_init(|| dir.clone());
        if *bound != dir {
            return Err(AgentError::RootAlreadyBound(bound.clone()));
        }
        tracing::info!(root = %dir.display(), "project root bound");
        Ok(dir)
    }

    pub fn root(&self) -> Result<&Path, AgentError> {
        self.root
            .get()
            .map(PathBuf::as_path)
            .ok_or(AgentError::RootNotInitialized)
    }
}

/// 沙箱：所有路径都相对项目根目录解析，越界即 PathEscape
#[derive(Debug, Clone)]
pub struct Sandbox {
    context: ProjectContext,
}

impl Sandbox {
    pub fn new(context: ProjectContext) -> Self {
        Self { context }
    }

    pub fn root(&self) -> Result<&Path, AgentError> {
        self.context.root()
    }

    /// 解析并校验路径（如 ../../etc/passwd 会被拒绝）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let root = self.root()?;
        let resolved = normalize(&root.join(path));
        if resolved.starts_with(root) {
            Ok(resolved)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    /// 已解析的绝对路径 -> 相对根目录的显示路径（统一用 /）
    pub fn relative(&self, resolved: &Path) -> Result<String, AgentError> {
        let root = self.root()?;
        let rel = resolved
            .strip_prefix(root)
            .map_err(|_| AgentError::PathEscape(resolved.display().to_string()))?;
        Ok(rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// 逐段规范化：已存在的前缀用 canonicalize 跟随符号链接，不存在的部分按字面处理 `.` 与 `..`
fn normalize(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if let Ok(real) = resolved.canonicalize() {
                    resolved = real;
                }
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bound_sandbox(dir: &TempDir) -> Sandbox {
        let ctx = ProjectContext::new(dir.path());
        ctx.ensure_root("demo").unwrap();
        Sandbox::new(ctx)
    }

    #[test]
    fn test_slug_charset() {
        assert_eq!(project_slug("hello world page"), "hello-world-page");
        assert_eq!(project_slug("  My  App!!  v2 "), "my-app-v2");
        assert_eq!(project_slug("snake_case-ok"), "snake_case-ok");
        assert_eq!(project_slug("Ünïcode Náme"), "n-code-n-me");
        for name in ["", "   ", "!!!", "---", "…"] {
            assert_eq!(project_slug(name), DEFAULT_PROJECT_DIR, "{name:?}");
        }
        for name in ["a--b", "--x--", "A B  C", "x/../y", "tab\tname"] {
            let slug = project_slug(name);
            assert!(!slug.is_empty());
            assert!(!slug.contains("--"), "{slug}");
            assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'));
        }
    }

    #[test]
    fn test_ensure_root_creates_directory() {
        let dir = TempDir::new().unwrap();
        let ctx = ProjectContext::new(dir.path().join("nested/base"));
        let root = ctx.ensure_root("Hello World Page").unwrap();
        assert!(root.is_dir());
        assert_eq!(root.file_name().unwrap(), "hello-world-page");
        // 同名再次调用得到同一路径，换名则拒绝
        assert_eq!(ctx.ensure_root("hello world page").unwrap(), root);
        assert!(matches!(
            ctx.ensure_root("other"),
            Err(AgentError::RootAlreadyBound(_))
        ));
    }

    #[test]
    fn test_resolve_before_root_fails() {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(ProjectContext::new(dir.path()));
        assert!(matches!(
            sandbox.resolve("index.html"),
            Err(AgentError::RootNotInitialized)
        ));
    }

    #[test]
    fn test_resolve_containment() {
        let dir = TempDir::new().unwrap();
        let sandbox = bound_sandbox(&dir);
        let root = sandbox.root().unwrap().to_path_buf();

        assert_eq!(sandbox.resolve("./x/y").unwrap(), root.join("x/y"));
        assert_eq!(sandbox.resolve(".").unwrap(), root);
        assert_eq!(sandbox.resolve("a/../b").unwrap(), root.join("b"));
        for escape in ["../../etc/passwd", "a/../../b", "..", "/etc/passwd"] {
            assert!(
                matches!(sandbox.resolve(escape), Err(AgentError::PathEscape(_))),
                "{escape}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_follows_symlinks() {
        let dir = TempDir::new().unwrap();
        let sandbox = bound_sandbox(&dir);
        let root = sandbox.root().unwrap().to_path_buf();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert!(matches!(
            sandbox.resolve("link/secret.txt"),
            Err(AgentError::PathEscape(_))
        ));
    }

    #[test]
    fn test_relative_uses_forward_slashes() {
        let dir = TempDir::new().unwrap();
        let sandbox = bound_sandbox(&dir);
        let resolved = sandbox.resolve("src/app.js").unwrap();
        assert_eq!(sandbox.relative(&resolved).unwrap(), "src/app.js");
    }
}
