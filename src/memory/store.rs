//! 记忆存储：有序消息历史与 token 预算
//!
//! append 后消息不可变，插入顺序即会话因果顺序。token 估算用字符数/4 的廉价确定性代理，
//! 只要求单调（字符越多估算不减）不要求精确。两级预算：软阈值触发步间例行压缩，
//! 硬阈值触发紧急清理（仅保留 system 消息与最近一条 user 请求）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Phase;

/// 每 token 的近似字符数（英文文本的常用估算常数）
const CHARS_PER_TOKEN: usize = 4;

/// 消息角色（与 LLM API 一致，tool 为工具结果回写）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 单条消息；phase 标记产生该消息时任务所处的阶段，
/// 使阶段完成证据成为查表而非全文扫描
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            phase: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// 附加阶段证据标记
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// 记忆体量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub message_count: usize,
    pub char_count: usize,
    pub estimated_tokens: usize,
}

/// 记忆存储：有序消息序列 + 软/硬 token 阈值
#[derive(Debug, Clone)]
pub struct MemoryStore {
    messages: Vec<Message>,
    soft_limit_tokens: usize,
    hard_limit_tokens: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(2500, 4000)
    }
}

impl MemoryStore {
    pub fn new(soft_limit_tokens: usize, hard_limit_tokens: usize) -> Self {
        Self {
            messages: Vec::new(),
            soft_limit_tokens,
            hard_limit_tokens,
        }
    }

    /// 置入种子 system 消息（会话创建或重置时）
    pub fn seed_system(&mut self, prompt: &str) {
        self.messages.push(Message::system(prompt));
    }

    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 替换全部消息（持久化恢复用）
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// 重置为仅保留种子 system 消息（Router 切换任务时）
    pub fn reset_to_seed(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    pub fn stats(&self) -> MemoryStats {
        let char_count: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        MemoryStats {
            message_count: self.messages.len(),
            char_count,
            estimated_tokens: (char_count / CHARS_PER_TOKEN).max(1),
        }
    }

    pub fn over_soft_limit(&self) -> bool {
        self.stats().estimated_tokens > self.soft_limit_tokens
    }

    pub fn over_hard_limit(&self) -> bool {
        self.stats().estimated_tokens > self.hard_limit_tokens
    }

    /// 是否存在某阶段产生的证据消息（阶段完成标记）
    pub fn has_phase_evidence(&self, phase: Phase) -> bool {
        self.messages.iter().any(|m| m.phase == Some(phase))
    }

    /// 取某阶段最近一条证据消息的内容（Assemble 合成用）
    pub fn latest_phase_evidence(&self, phase: Phase) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.phase == Some(phase))
            .map(|m| m.content.as_str())
    }

    /// 例行压缩：无条件保留全部 system 消息与最近 preserve_recent 条，
    /// 其余从最旧开始丢弃，直到总条数 ≤ max_messages 或中段耗尽。
    /// 已在预算内时为 no-op（返回 false）；相同参数重复应用幂等。
    pub fn compress(&mut self, max_messages: usize, preserve_recent: usize) -> bool {
        if self.messages.len() <= max_messages {
            return false;
        }

        let recent_start = self.messages.len().saturating_sub(preserve_recent);
        let mut kept: Vec<(usize, Message)> = Vec::with_capacity(self.messages.len());
        let mut middle: Vec<(usize, Message)> = Vec::new();

        for (i, msg) in self.messages.drain(..).enumerate() {
            if msg.role == Role::System || i >= recent_start {
                kept.push((i, msg));
            } else {
                middle.push((i, msg));
            }
        }

        // 中段从最旧开始丢弃
        let budget_for_middle = max_messages.saturating_sub(kept.len());
        let drop_count = middle.len().saturating_sub(budget_for_middle);
        let survivors = middle.split_off(drop_count);

        // 按原始插入下标合并，任何位置的 system 消息都保持因果顺序
        kept.extend(survivors);
        kept.sort_by_key(|(i, _)| *i);
        self.messages = kept.into_iter().map(|(_, msg)| msg).collect();

        tracing::info!(
            messages = self.messages.len(),
            dropped = drop_count,
            "memory compressed"
        );
        drop_count > 0
    }

    /// 紧急清理：仅保留 system 消息与最近一条 user 请求。
    /// 用于例行压缩后仍超硬阈值（如单条超大工具结果）及任务取消后。
    pub fn emergency_clear(&mut self) {
        let last_user = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned();
        self.messages.retain(|m| m.role == Role::System);
        if let Some(msg) = last_user {
            self.messages.push(msg);
        }
        tracing::warn!(messages = self.messages.len(), "emergency memory clear");
    }
}
