//! 沙箱文件落盘工具
//!
//! 所有写入被限制在 workspace 根目录下：拒绝绝对路径与任何 `..` 组件，
//! 路径逃逸是 PathEscape 错误而非静默改写。父目录按需创建。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::core::AgentError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，写入前校验路径在根下
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 校验写入路径：拒绝绝对路径与 `..`，返回根下的完整路径
    pub fn resolve_for_write(&self, path: &str) -> Result<PathBuf, AgentError> {
        let candidate = Path::new(path.trim());
        if candidate.as_os_str().is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing path".to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                // ../ 与绝对路径前缀都可逃出沙箱，如 ../../etc/passwd
                _ => return Err(AgentError::PathEscape(path.to_string())),
            }
        }
        Ok(self.root_dir.join(candidate))
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, AgentError> {
        let resolved = self.resolve_for_write(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Create dir: {}", e)))?;
        }
        fs::write(&resolved, content)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        Ok(resolved)
    }
}

/// write_file 工具：把装配好的文档写进沙箱
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the workspace. Args: {\"path\": \"relative path\", \"content\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return Err("Missing path".to_string());
        }
        tracing::info!(path = %path, bytes = content.len(), "write_file tool execute");
        let resolved = self
            .fs
            .write_file(path, content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            resolved.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_parent_dir_escape() {
        let fs = SafeFs::new("/tmp/sandbox");
        let err = fs.resolve_for_write("../../etc/passwd").unwrap_err();
        assert!(matches!(err, AgentError::PathEscape(_)));
    }

    #[test]
    fn test_rejects_absolute_path() {
        let fs = SafeFs::new("/tmp/sandbox");
        let err = fs.resolve_for_write("/etc/passwd").unwrap_err();
        assert!(matches!(err, AgentError::PathEscape(_)));
    }

    #[test]
    fn test_resolves_relative_path_under_root() {
        let fs = SafeFs::new("/tmp/sandbox");
        let resolved = fs.resolve_for_write("out/report.md").unwrap();
        assert!(resolved.starts_with("/tmp/sandbox"));
    }

    #[tokio::test]
    async fn test_write_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path());
        let out = tool
            .execute(serde_json::json!({"path": "nested/doc.md", "content": "# hi"}))
            .await
            .unwrap();
        assert!(out.starts_with("Wrote 4 bytes"));
        let written = std::fs::read_to_string(dir.path().join("nested/doc.md")).unwrap();
        assert_eq!(written, "# hi");
    }

    #[tokio::test]
    async fn test_escape_attempt_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "../outside.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(err.contains("escape"));
    }
}
