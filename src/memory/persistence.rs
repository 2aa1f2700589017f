//! 会话快照持久化
//!
//! 将会话标识、有序消息序列与当前任务阶段写入/从 JSON 文件加载，
//! 足以跨进程重启确定性地恢复一个任务（可选使用）。

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::Message;
use crate::task::Phase;

/// 快照内容：恢复一个会话所需的最小状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
    pub task_phase: Option<Phase>,
}

/// 简单的文件持久化：单文件 JSON
#[derive(Debug)]
pub struct SessionPersistence {
    path: std::path::PathBuf,
}

impl SessionPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 从 JSON 文件加载快照；文件不存在时返回 None
    pub fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// 写入快照；父目录不存在时自动创建
    pub fn save(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(snapshot)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Message, Role};

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionPersistence::new(dir.path().join("session.json"));

        let snapshot = SessionSnapshot {
            session_id: Uuid::new_v4(),
            messages: vec![
                Message::system("seed"),
                Message::user("build a page with trending news"),
                Message::tool("search results").with_phase(Phase::Search),
            ],
            task_phase: Some(Phase::Extract),
        };
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.session_id, snapshot.session_id);
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.messages[2].phase, Some(Phase::Search));
        assert_eq!(loaded.messages[2].role, Role::Tool);
        assert_eq!(loaded.task_phase, Some(Phase::Extract));
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionPersistence::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }
}
