//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供工作者步循环决定是覆写阶段、重试、压缩还是终局。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（覆写 / 重试 / 压缩 / 失败 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ParseFailure => RecoveryAction::OverridePhase,
            AgentError::ToolExecutionFailed(_)
            | AgentError::ToolTimeout(_)
            | AgentError::ModelTimeout
            | AgentError::LlmError(_) => RecoveryAction::RetryStep,
            AgentError::ContextOverflow => RecoveryAction::CompressContext,
            AgentError::LoopDetected { .. } => RecoveryAction::FailTask,
            AgentError::Cancelled => RecoveryAction::Abort,
            AgentError::ConfigError(_) | AgentError::PathEscape(_) => RecoveryAction::FailTask,
        }
    }
}
