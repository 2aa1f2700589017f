//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定覆写阶段 / 重试 / 压缩上下文 / 任务失败等。
//! 除进程级资源耗尽外，所有错误都在核心内转为状态迁移或终局结果，不向调用方抛未处理故障。

use thiserror::Error;

use crate::task::Phase;

/// Agent 运行过程中可能出现的错误（解析、工具、模型、预算、路径逃逸等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 归一化器未能从模型输出提取任何可用调用；非致命，触发阶段状态机覆写
    #[error("No usable tool call in model output")]
    ParseFailure,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Model completion timeout")]
    ModelTimeout,

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 压缩后仍超硬阈值；触发紧急清理，从不致命
    #[error("Context overflow after compression")]
    ContextOverflow,

    /// 阶段重试预算耗尽；任务级致命，进程继续
    #[error("Loop detected: retry budget exhausted in phase {phase:?}")]
    LoopDetected { phase: Phase },

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 让阶段状态机合成本阶段所需调用并继续（模型输出为空或跑偏）
    OverridePhase,
    /// 记一次阶段失败后重试本步（工具/模型的瞬时失败）
    RetryStep,
    /// 压缩上下文（仍超硬阈值时由记忆层升级为紧急清理）后继续
    CompressContext,
    /// 任务转入 Failed 并向调用方给出终局消息
    FailTask,
    /// 终止当前任务（取消等）
    Abort,
}
