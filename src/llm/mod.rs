//! LLM 客户端模块：抽象 trait、OpenAI 兼容实现与测试用脚本实现

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::ScriptedLlm;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;
