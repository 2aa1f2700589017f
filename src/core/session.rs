//! 会话上下文
//!
//! 显式 Session 对象取代全局可变状态：每个会话持有自己的 MemoryStore、工作者指派与活动任务，
//! 随每次核心调用显式传入；多个会话可并发运行，彼此仅共享只读配置。

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::memory::MemoryStore;
use crate::router::WorkerAssignment;
use crate::task::Task;

/// 会话：一次持续交互，拥有至多一个活的工作者指派与一个记忆存储
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub memory: MemoryStore,
    /// 当前工作者指派；重指派需显式重置记忆（由 Router 执行）
    pub assignment: Option<WorkerAssignment>,
    /// 当前多步任务；到达终态后在下一次会话活动时丢弃
    pub task: Option<Task>,
    /// 步间取消令牌；取消使任务直接 Failed 并触发紧急压缩
    cancel: CancellationToken,
}

impl Session {
    pub fn new(seed_system_prompt: &str) -> Self {
        Self::with_memory(seed_system_prompt, MemoryStore::default())
    }

    /// 指定记忆预算的会话（阈值来自 [memory] 配置段）
    pub fn with_limits(seed_system_prompt: &str, soft_limit: usize, hard_limit: usize) -> Self {
        Self::with_memory(seed_system_prompt, MemoryStore::new(soft_limit, hard_limit))
    }

    fn with_memory(seed_system_prompt: &str, mut memory: MemoryStore) -> Self {
        if !seed_system_prompt.is_empty() {
            memory.seed_system(seed_system_prompt);
        }
        Self {
            id: Uuid::new_v4(),
            memory,
            assignment: None,
            task: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 触发取消；步循环在下一个步间检查点响应
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 丢弃已到达终态的任务（Done/Failed 后的首次会话活动调用）
    pub fn drop_finished_task(&mut self) {
        if let Some(ref task) = self.task {
            if task.phase().is_terminal() {
                self.task = None;
            }
        }
    }
}
