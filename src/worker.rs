//! 工作者步循环
//!
//! 每会话严格串行：预算检查 → 模型补全（带超时）→ 归一化 → 阶段机裁决 →
//! 工具执行（带超时与审计）→ 写回阶段标记的工具结果 → 推进或重试。
//! 模型输出为空或跑偏不会卡住循环：阶段机直接合成覆盖调用。
//! 模型/工具超时是普通失败，走恢复路径计入重试预算，不是崩溃。

use std::time::Duration;

use tokio::time::timeout;

use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, Session};
use crate::llm::LlmClient;
use crate::memory::{MemoryStore, Message};
use crate::normalize::normalize;
use crate::router::WorkerKind;
use crate::task::{Decision, Phase, Task};
use crate::tools::ToolExecutor;

/// 终局消息中证据预览的最大字符数
const EVIDENCE_PREVIEW_CHARS: usize = 600;

/// 该类别的工作者是否走多步阶段机
pub fn kind_is_phased(kind: WorkerKind) -> bool {
    matches!(kind, WorkerKind::Browser | WorkerKind::File)
}

/// 按工作者类别与可用工具生成种子系统提示词
pub fn system_prompt_for(kind: WorkerKind, executor: &ToolExecutor) -> String {
    let role = match kind {
        WorkerKind::Browser => "You browse the web and report what you find.",
        WorkerKind::File => "You gather material and assemble documents or pages.",
        WorkerKind::Code => "You help with programming questions and code.",
        WorkerKind::Planner => "You break work into ordered, actionable steps.",
        WorkerKind::General => "You are a helpful assistant.",
    };
    let mut tools_block = String::new();
    for (name, description) in executor.tool_descriptions() {
        tools_block.push_str(&format!("- {}: {}\n", name, description));
    }
    format!(
        "{}\n\nAvailable tools:\n{}\nWhen a tool is needed, answer with a JSON object: {{\"name\": \"tool\", \"arguments\": {{...}}}}.",
        role, tools_block
    )
}

/// 工作者：一个类别档案 + 共享组件的借用，驱动单个会话的一次请求
pub struct Worker<'a> {
    kind: WorkerKind,
    llm: &'a dyn LlmClient,
    executor: &'a ToolExecutor,
    recovery: &'a RecoveryEngine,
    config: &'a AppConfig,
}

impl<'a> Worker<'a> {
    pub fn new(
        kind: WorkerKind,
        llm: &'a dyn LlmClient,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            kind,
            llm,
            executor,
            recovery,
            config,
        }
    }

    /// 两级预算：超软阈值先例行压缩，压缩后仍超硬阈值算 ContextOverflow，
    /// 经恢复引擎升级为紧急清理
    fn budget_pass(&self, memory: &mut MemoryStore) {
        if memory.over_soft_limit() {
            memory.compress(
                self.config.memory.max_messages,
                self.config.memory.preserve_recent,
            );
        }
        if memory.over_hard_limit()
            && self.recovery.handle(&AgentError::ContextOverflow) == RecoveryAction::CompressContext
        {
            memory.emergency_clear();
        }
    }

    /// 处理一次用户请求，驱动任务直至终态或直接应答
    pub async fn run(&self, session: &mut Session, request: &str) -> Result<String, AgentError> {
        session.memory.append(Message::user(request));
        if session.task.is_none() {
            session.task = Some(Task::new(request, self.config.task.retry_budget));
        }
        let phased = kind_is_phased(self.kind)
            && session
                .task
                .as_ref()
                .map(|t| t.shape().is_multi_step())
                .unwrap_or(false);
        let request_timeout = Duration::from_secs(self.config.llm.request_timeout_secs);

        for step in 0..self.config.task.max_steps {
            if session.is_cancelled() {
                if let Some(task) = session.task.as_mut() {
                    task.abort();
                }
                session.memory.emergency_clear();
                return Err(AgentError::Cancelled);
            }

            self.budget_pass(&mut session.memory);

            let output = match timeout(request_timeout, self.llm.complete(session.memory.messages()))
                .await
            {
                Ok(Ok(text)) => text,
                completion => {
                    let err = match completion {
                        Ok(Err(e)) => e,
                        _ => AgentError::ModelTimeout,
                    };
                    let attempted = session
                        .task
                        .as_ref()
                        .and_then(|t| t.pending_phase(&session.memory))
                        .unwrap_or(Phase::Init);
                    match self.recovery.handle(&err) {
                        RecoveryAction::RetryStep => {
                            if let Some(task) = session.task.as_mut() {
                                if task.record_failure().is_err() {
                                    return Ok(failure_message(attempted, &err));
                                }
                            }
                            continue;
                        }
                        _ => return Err(err),
                    }
                }
            };

            if !output.trim().is_empty() {
                session.memory.append(Message::assistant(output.clone()));
            }
            if !phased {
                return Ok(output);
            }

            let calls = normalize(&output);
            if calls.is_empty()
                && self.recovery.handle(&AgentError::ParseFailure) != RecoveryAction::OverridePhase
            {
                // 恢复引擎不建议覆写时才把解析失败抛给调用方
                return Err(AgentError::ParseFailure);
            }
            let decision = match session.task.as_ref() {
                Some(task) => task.decide(&calls, &session.memory),
                None => Decision::Respond,
            };
            match decision {
                Decision::Respond => return Ok(output),
                Decision::Complete => {
                    if let Some(task) = session.task.as_mut() {
                        task.finish();
                    }
                    return Ok(completion_message(session));
                }
                Decision::Execute {
                    call,
                    phase,
                    synthesized,
                } => {
                    if synthesized {
                        tracing::info!(step, phase = ?phase, tool = %call.name, "phase override applied");
                    }
                    match self.executor.execute(&call).await {
                        Ok(result) => {
                            session.memory.append(Message::tool(result).with_phase(phase));
                            if let Some(task) = session.task.as_mut() {
                                task.record_success(phase);
                            }
                        }
                        Err(e) => {
                            session
                                .memory
                                .append(Message::tool(format!("Tool {} failed: {}", call.name, e)));
                            match self.recovery.handle(&e) {
                                RecoveryAction::RetryStep => {
                                    if let Some(task) = session.task.as_mut() {
                                        if task.record_failure().is_err() {
                                            return Ok(failure_message(phase, &e));
                                        }
                                    }
                                }
                                RecoveryAction::Abort => return Err(e),
                                _ => {
                                    if let Some(task) = session.task.as_mut() {
                                        task.abort();
                                    }
                                    return Ok(failure_message(phase, &e));
                                }
                            }
                        }
                    }
                }
            }
        }

        let attempted = session
            .task
            .as_ref()
            .and_then(|t| t.pending_phase(&session.memory))
            .or_else(|| session.task.as_ref().map(|t| t.phase()))
            .unwrap_or(Phase::Init);
        if let Some(task) = session.task.as_mut() {
            task.abort();
        }
        Ok(format!(
            "Task failed in phase {:?}: reached the maximum of {} steps before finishing.",
            attempted, self.config.task.max_steps
        ))
    }

}

fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}...", text.chars().take(limit).collect::<String>())
    } else {
        text.to_string()
    }
}

fn completion_message(session: &Session) -> String {
    let evidence = session
        .memory
        .latest_phase_evidence(Phase::Assemble)
        .or_else(|| session.memory.latest_phase_evidence(Phase::Navigate))
        .or_else(|| session.memory.latest_phase_evidence(Phase::Extract))
        .unwrap_or("(no evidence collected)");
    format!("Task completed.\n\n{}", preview(evidence, EVIDENCE_PREVIEW_CHARS))
}

fn failure_message(phase: Phase, err: &AgentError) -> String {
    format!("Task failed in phase {:?}: {}", phase, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CannedTool {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Tool for CannedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "canned"
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            Ok(self.reply.to_string())
        }
    }

    struct FailingTool {
        name: &'static str,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err("connection refused".to_string())
        }
    }

    fn canned_executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(CannedTool {
            name: "search",
            reply: "1. Big story https://news.example.com/a\n2. Other story",
        });
        registry.register(CannedTool {
            name: "extract",
            reply: "Big story happened today in three places.",
        });
        registry.register(CannedTool {
            name: "write_file",
            reply: "Wrote 120 bytes to workspace/assembled_document.md",
        });
        ToolExecutor::new(registry, 5)
    }

    #[tokio::test]
    async fn test_conversation_returns_model_text() {
        let config = AppConfig::default();
        let llm = ScriptedLlm::new(["Rust is a systems programming language."]);
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::General, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");

        let reply = worker.run(&mut session, "what is rust?").await.unwrap();
        assert_eq!(reply, "Rust is a systems programming language.");
    }

    #[tokio::test]
    async fn test_empty_model_outputs_still_finish_the_workflow() {
        let config = AppConfig::default();
        // 模型三步全部交白卷，阶段机必须靠覆盖合成推完整个工作流
        let llm = ScriptedLlm::new(["", "", "", ""]);
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::File, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");

        let reply = worker
            .run(&mut session, "save top 3 news headlines to a txt file")
            .await
            .unwrap();
        assert!(reply.starts_with("Task completed."));
        let task = session.task.as_ref().unwrap();
        assert_eq!(task.phase(), Phase::Done);
        assert!(session.memory.has_phase_evidence(Phase::Search));
        assert!(session.memory.has_phase_evidence(Phase::Extract));
        assert!(session.memory.has_phase_evidence(Phase::Assemble));
    }

    #[tokio::test]
    async fn test_hard_limit_escalates_to_emergency_clear() {
        let mut config = AppConfig::default();
        config.memory.soft_limit_tokens = 10;
        config.memory.hard_limit_tokens = 20;
        let llm = ScriptedLlm::new(["ok"]);
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::General, &llm, &executor, &recovery, &config);
        let mut session = Session::with_limits("seed", 10, 20);
        for i in 0..10 {
            session
                .memory
                .append(Message::assistant(format!("padding line number {} with quite a few extra words", i)));
        }

        let reply = worker.run(&mut session, "hello there").await.unwrap();
        assert_eq!(reply, "ok");
        // 例行压缩在消息数内不生效，硬阈值超限走紧急清理：种子 + 最后的 user + 本次回答
        assert_eq!(session.memory.stats().message_count, 3);
    }

    #[tokio::test]
    async fn test_repeated_tool_failures_exhaust_retry_budget() {
        let config = AppConfig::default();
        let llm = ScriptedLlm::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool {
            name: "search",
            attempts: attempts.clone(),
        });
        let executor = ToolExecutor::new(registry, 5);
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::File, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");

        let reply = worker
            .run(&mut session, "save top 3 news headlines to a txt file")
            .await
            .unwrap();
        assert!(reply.contains("Task failed in phase Search"));
        assert!(reply.contains("connection refused"));
        assert_eq!(attempts.load(Ordering::SeqCst), config.task.retry_budget);
        assert_eq!(session.task.as_ref().unwrap().phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_max_steps_exit_names_last_attempted_phase() {
        let mut config = AppConfig::default();
        // 两步只够走完 Search 和 Extract，Assemble 未到即触顶
        config.task.max_steps = 2;
        let llm = ScriptedLlm::default();
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::File, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");

        let reply = worker
            .run(&mut session, "save top 3 news headlines to a txt file")
            .await
            .unwrap();
        assert!(reply.contains("Task failed in phase Assemble"));
        assert!(reply.contains("maximum of 2 steps"));
        assert_eq!(session.task.as_ref().unwrap().phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn test_cancellation_fails_task_and_clears_memory() {
        let config = AppConfig::default();
        let llm = ScriptedLlm::default();
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::File, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");
        session.cancel();

        let err = worker
            .run(&mut session, "save top 3 news headlines to a txt file")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(session.task.as_ref().unwrap().phase(), Phase::Failed);
        // 紧急清理后仅剩 system 种子与最后一条 user 请求
        assert_eq!(session.memory.stats().message_count, 2);
    }

    #[tokio::test]
    async fn test_model_call_matching_phase_is_accepted() {
        let config = AppConfig::default();
        let llm = ScriptedLlm::new([
            r#"{"name": "search", "arguments": {"query": "top 3 world news today"}}"#,
            "",
            "",
            "",
        ]);
        let executor = canned_executor();
        let recovery = RecoveryEngine::new();
        let worker = Worker::new(WorkerKind::File, &llm, &executor, &recovery, &config);
        let mut session = Session::new("seed");

        let reply = worker
            .run(&mut session, "save top 3 news headlines to a txt file")
            .await
            .unwrap();
        assert!(reply.starts_with("Task completed."));
        // 模型那条合法调用被原样使用，未额外消耗脚本
        assert_eq!(llm.remaining(), 0);
    }
}
