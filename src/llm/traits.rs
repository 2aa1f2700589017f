//! LLM 客户端抽象
//!
//! 后端（OpenAI 兼容端点 / 测试用脚本客户端）统一实现 LlmClient。
//! 返回值是原始文本：调用方自行归一化，客户端不解析工具调用。

use async_trait::async_trait;

use crate::core::error::AgentError;
use crate::memory::Message;

/// LLM 客户端 trait：非流式完成 + 累计 token 统计
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
