//! 记忆层：有序消息历史、预算压缩、会话快照持久化

pub mod persistence;
pub mod store;

pub use persistence::{SessionPersistence, SessionSnapshot};
pub use store::{MemoryStats, MemoryStore, Message, Role};
