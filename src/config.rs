//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WEAVER__*` 覆盖（双下划线表示嵌套，如 `WEAVER__LLM__MODEL=gpt-4o-mini`）。
//! [router] 段的关键词集可整体替换：续接/重置与工作者分类的具体词表属于可调策略，而非硬编码规则。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub task: TaskSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录（write_file 沙箱根）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次模型补全超时（秒）；超时按普通失败走重试路径
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [memory] 段：软/硬 token 阈值与压缩参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 步间例行压缩的触发阈值（估算 token）
    pub soft_limit_tokens: usize,
    /// 紧急清理的触发阈值（估算 token）
    pub hard_limit_tokens: usize,
    /// 例行压缩的目标消息条数上限
    pub max_messages: usize,
    /// 例行压缩无条件保留的最近消息条数
    pub preserve_recent: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            soft_limit_tokens: 2500,
            hard_limit_tokens: 4000,
            max_messages: 12,
            preserve_recent: 6,
        }
    }
}

/// [task] 段：阶段状态机的步数与重试预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskSection {
    /// 单个任务的最大执行步数，防止死循环
    pub max_steps: usize,
    /// 同一阶段允许的失败次数；达到即永久 Failed
    pub retry_budget: u32,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            max_steps: 20,
            retry_budget: 3,
        }
    }
}

/// [router] 段：各工作者类别的关键词集（可调策略，整表可覆盖）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub browser_keywords: Vec<String>,
    pub file_keywords: Vec<String>,
    pub code_keywords: Vec<String>,
    pub planner_keywords: Vec<String>,
    /// 导航动词（go to / visit / open …），用于导航+建页混合请求的优先级判定
    pub navigation_keywords: Vec<String>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            browser_keywords: [
                "browse", "website", "web", "www", "http", "url", "search", "click",
                "navigate", "download", "scrape", "visit", "page", "go to",
            ]
            .map(String::from)
            .to_vec(),
            file_keywords: [
                "create", "make", "build", "generate", "write to file", "save to file",
                "file", "folder", "directory", "save", "html file", "webpage",
            ]
            .map(String::from)
            .to_vec(),
            code_keywords: [
                "code", "program", "script", "function", "debug", "compile", "execute",
                "python", "javascript", "rust",
            ]
            .map(String::from)
            .to_vec(),
            planner_keywords: [
                "plan", "task list", "step", "organize", "schedule", "workflow",
                "project", "break down", "strategy",
            ]
            .map(String::from)
            .to_vec(),
            navigation_keywords: [
                "go to", "visit", "navigate to", "open", "browse to", "look at",
                "check out",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// [tools] 段：工具超时、抓取限制、域名白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 抓取结果最大字符数，超出截断
    pub max_result_chars: usize,
    /// 抓取 URL 的超时（秒）
    pub fetch_timeout_secs: u64,
    /// 允许抓取的域名白名单；为空表示不限制
    pub allowed_domains: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_result_chars: 8000,
            fetch_timeout_secs: 15,
            allowed_domains: Vec::new(),
        }
    }
}

impl AppConfig {
    /// 启动期校验：预算阈值与步数参数必须自洽，否则拒绝启动
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.memory.soft_limit_tokens >= self.memory.hard_limit_tokens {
            return Err(AgentError::ConfigError(format!(
                "memory.soft_limit_tokens ({}) must be below hard_limit_tokens ({})",
                self.memory.soft_limit_tokens, self.memory.hard_limit_tokens
            )));
        }
        if self.memory.preserve_recent >= self.memory.max_messages {
            return Err(AgentError::ConfigError(format!(
                "memory.preserve_recent ({}) must be below max_messages ({})",
                self.memory.preserve_recent, self.memory.max_messages
            )));
        }
        if self.task.max_steps == 0 || self.task.retry_budget == 0 {
            return Err(AgentError::ConfigError(
                "task.max_steps and task.retry_budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            memory: MemorySection::default(),
            task: TaskSection::default(),
            router: RouterSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 WEAVER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WEAVER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WEAVER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.memory.soft_limit_tokens < cfg.memory.hard_limit_tokens);
        assert!(cfg.memory.preserve_recent < cfg.memory.max_messages);
        assert!(cfg.task.retry_budget > 0);
    }

    #[test]
    fn test_validate_rejects_inverted_memory_limits() {
        let mut cfg = AppConfig::default();
        cfg.memory.soft_limit_tokens = cfg.memory.hard_limit_tokens + 1;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
        assert!(err.to_string().contains("soft_limit_tokens"));
    }

    #[test]
    fn test_validate_rejects_zero_retry_budget() {
        let mut cfg = AppConfig::default();
        cfg.task.retry_budget = 0;
        assert!(cfg.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_router_keywords_nonempty() {
        let cfg = RouterSection::default();
        assert!(cfg.browser_keywords.iter().any(|k| k == "go to"));
        assert!(cfg.file_keywords.iter().any(|k| k == "create"));
    }
}
