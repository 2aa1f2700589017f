//! 核心层：错误与恢复、会话上下文

pub mod error;
pub mod recovery;
pub mod session;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use session::Session;
