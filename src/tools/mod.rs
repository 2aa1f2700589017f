//! 工具模块：注册表、执行器与四个规范工具（navigate / search / extract / write_file）

pub mod executor;
pub mod registry;
pub mod web;
pub mod write_file;

use std::path::PathBuf;
use std::sync::Arc;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use web::{ExtractTool, NavigateTool, PageFetcher, SearchTool};
pub use write_file::{SafeFs, WriteFileTool};

use crate::config::{AppSection, ToolsSection};

/// 按配置装配全套规范工具并包上执行器
pub fn build_executor(app: &AppSection, tools: &ToolsSection) -> ToolExecutor {
    let fetcher = Arc::new(PageFetcher::new(
        tools.allowed_domains.clone(),
        tools.fetch_timeout_secs,
        tools.max_result_chars,
    ));
    let workspace = app
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("./workspace"));

    let mut registry = ToolRegistry::new();
    registry.register(NavigateTool::new(fetcher.clone()));
    registry.register(SearchTool::new(fetcher.clone()));
    registry.register(ExtractTool::new(fetcher));
    registry.register(WriteFileTool::new(workspace));
    ToolExecutor::new(registry, tools.tool_timeout_secs)
}
