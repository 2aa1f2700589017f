//! Weaver - 多步骤工具智能体编排核心
//!
//! 模块划分：
//! - **agent**: 组件装配与对外的 process_request 入口
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复引擎、会话上下文
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 测试脚本）
//! - **memory**: 记忆存储、token 预算与会话持久化
//! - **normalize**: 工具调用归一化（分层回退解析）
//! - **router**: 请求路由与工作者复用策略
//! - **task**: 任务阶段机（形态分类、覆盖合成、重试预算）
//! - **tools**: 规范工具（navigate / search / extract / write_file）与执行器
//! - **worker**: 工作者步循环

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod normalize;
pub mod observability;
pub mod router;
pub mod task;
pub mod tools;
pub mod worker;
