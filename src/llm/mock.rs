//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 按预排队的固定应答逐条出队；队列耗尽后返回空串，
//! 正好用来验证空输出被阶段状态机覆写的路径。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::error::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 脚本客户端：new 传入应答序列，complete 依次出队
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    /// 剩余未消费的应答条数
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, AgentError> {
        let mut queue = self
            .replies
            .lock()
            .map_err(|_| AgentError::LlmError("scripted reply queue poisoned".to_string()))?;
        Ok(queue.pop_front().unwrap_or_default())
    }
}
