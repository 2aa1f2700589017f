//! 任务阶段机
//!
//! 模型输出是建议而非指令：每一步先由阶段机根据记忆中的阶段证据标签
//! 推断「下一必经阶段」，模型给出的调用满足该阶段则采纳，否则合成一条
//! 覆盖调用强行推进。空输出、跑题输出一律被覆盖，工作流不会原地空转。

use serde_json::Value;

use crate::core::error::AgentError;
use crate::memory::MemoryStore;
use crate::normalize::{
    strategies::extract_locator_calls, ToolCall, TOOL_EXTRACT, TOOL_NAVIGATE, TOOL_SEARCH,
    TOOL_WRITE_FILE,
};
use crate::task::phase::{classify, derive_search_query, Phase, TaskShape};

/// 阶段机对单步模型输出的裁决
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 对话形态：不走阶段机，模型文本直接作为回复
    Respond,
    /// 执行一条调用推进当前阶段；synthesized 标记该调用是否为覆盖合成
    Execute {
        call: ToolCall,
        phase: Phase,
        synthesized: bool,
    },
    /// 全部必经阶段均有证据，任务收口
    Complete,
}

/// 单个任务的生命周期状态；形态在创建时定死，阶段历史单调非降
#[derive(Debug, Clone)]
pub struct Task {
    description: String,
    shape: TaskShape,
    phase: Phase,
    history: Vec<Phase>,
    retries: u32,
    retry_budget: u32,
    target_url: Option<String>,
}

impl Task {
    pub fn new(description: impl Into<String>, retry_budget: u32) -> Self {
        let description = description.into();
        let (shape, target_url) = classify(&description);
        Self {
            description,
            shape,
            phase: Phase::Init,
            history: vec![Phase::Init],
            retries: 0,
            retry_budget,
            target_url,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn shape(&self) -> TaskShape {
        self.shape
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn target_url(&self) -> Option<&str> {
        self.target_url.as_deref()
    }

    /// 下一必经阶段：序列中第一个尚无记忆证据的阶段；全有证据则 None
    pub fn pending_phase(&self, memory: &MemoryStore) -> Option<Phase> {
        self.shape
            .sequence()
            .iter()
            .copied()
            .find(|p| !memory.has_phase_evidence(*p))
    }

    /// 裁决一步：接受满足下一阶段的模型调用，否则合成覆盖调用
    pub fn decide(&self, calls: &[ToolCall], memory: &MemoryStore) -> Decision {
        if self.phase.is_terminal() {
            return Decision::Complete;
        }
        if !self.shape.is_multi_step() {
            return Decision::Respond;
        }
        let Some(pending) = self.pending_phase(memory) else {
            return Decision::Complete;
        };
        let required = required_tool(pending);
        if let Some(call) = calls.iter().find(|c| c.name == required) {
            return Decision::Execute {
                call: call.clone(),
                phase: pending,
                synthesized: false,
            };
        }
        tracing::info!(
            phase = ?pending,
            proposed = calls.len(),
            "model output does not advance workflow, synthesizing override"
        );
        Decision::Execute {
            call: self.synthesize(pending, memory),
            phase: pending,
            synthesized: true,
        }
    }

    /// 为指定阶段合成覆盖调用；Extract/Assemble 从既有阶段证据取材
    fn synthesize(&self, phase: Phase, memory: &MemoryStore) -> ToolCall {
        match phase {
            Phase::Navigate => {
                let url = self
                    .target_url
                    .clone()
                    .unwrap_or_else(|| "https://www.google.com".to_string());
                ToolCall::new(TOOL_NAVIGATE).with_arg("url", url)
            }
            Phase::Search => ToolCall::new(TOOL_SEARCH)
                .with_arg("query", derive_search_query(&self.description)),
            Phase::Extract => self.synthesize_extract(memory),
            Phase::Assemble => self.synthesize_assemble(memory),
            // Init 与终态没有对应工具；到这里说明序列表被改坏了
            _ => ToolCall::new(TOOL_SEARCH)
                .with_arg("query", derive_search_query(&self.description)),
        }
    }

    fn synthesize_extract(&self, memory: &MemoryStore) -> ToolCall {
        let goal = match self.shape {
            TaskShape::SiteReplication => {
                "Extract the complete page structure, layout and visual style"
            }
            _ => "Extract the main headlines, articles and key facts",
        };
        let mut call = ToolCall::new(TOOL_EXTRACT).with_arg("goal", goal);
        // 复刻/导航形态提取目标站本身；装配形态从搜索证据里挑第一个结果链接
        if let Some(url) = self.target_url.clone() {
            return call.with_arg("url", url);
        }
        if let Some(evidence) = memory.latest_phase_evidence(Phase::Search) {
            if let Some(found) = extract_locator_calls(evidence).into_iter().next() {
                if let Some(Value::String(url)) = found.arguments.get("url") {
                    return call.with_arg("url", url.clone());
                }
            }
            // 搜索结果没有可抓取的链接时退化为就地总结
            call = call.with_arg("content", evidence);
        }
        call
    }

    fn synthesize_assemble(&self, memory: &MemoryStore) -> ToolCall {
        let body = memory
            .latest_phase_evidence(Phase::Extract)
            .or_else(|| memory.latest_phase_evidence(Phase::Search))
            .or_else(|| memory.latest_phase_evidence(Phase::Navigate))
            .unwrap_or("No source material was collected.");
        let (path, content) = match self.shape {
            TaskShape::SiteReplication => (
                "assembled_page.html",
                format!(
                    "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
                    self.description, body
                ),
            ),
            _ => (
                "assembled_document.md",
                format!("# {}\n\n{}\n", self.description, body),
            ),
        };
        ToolCall::new(TOOL_WRITE_FILE)
            .with_arg("path", path)
            .with_arg("content", content)
    }

    /// 阶段成功推进：写入单调历史并清零重试计数
    pub fn record_success(&mut self, phase: Phase) {
        self.phase = phase;
        self.history.push(phase);
        self.retries = 0;
    }

    /// 所有阶段收口，任务进入 Done
    pub fn finish(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Done;
            self.history.push(Phase::Done);
        }
    }

    /// 立即终局（取消、步数耗尽等非重试型失败）
    pub fn abort(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
            self.history.push(Phase::Failed);
        }
    }

    /// 记录一次失败；连续失败触顶即永久 Failed（同会话不再复活）
    pub fn record_failure(&mut self) -> Result<(), AgentError> {
        self.retries += 1;
        if self.retries >= self.retry_budget {
            let last = self.phase;
            self.phase = Phase::Failed;
            self.history.push(Phase::Failed);
            return Err(AgentError::LoopDetected { phase: last });
        }
        Ok(())
    }
}

fn required_tool(phase: Phase) -> &'static str {
    match phase {
        Phase::Navigate => TOOL_NAVIGATE,
        Phase::Search => TOOL_SEARCH,
        Phase::Extract => TOOL_EXTRACT,
        Phase::Assemble => TOOL_WRITE_FILE,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    fn evidence(memory: &mut MemoryStore, phase: Phase, content: &str) {
        memory.append(Message::tool(content).with_phase(phase));
    }

    #[test]
    fn test_empty_output_is_overridden() {
        let task = Task::new("save top 5 news headlines to a txt file", 3);
        let memory = MemoryStore::default();
        match task.decide(&[], &memory) {
            Decision::Execute {
                call,
                phase,
                synthesized,
            } => {
                assert!(synthesized);
                assert_eq!(phase, Phase::Search);
                assert_eq!(call.name, TOOL_SEARCH);
                assert_eq!(call.arg_str("query"), "top 5 world news today");
            }
            other => panic!("expected override, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_model_call_is_accepted() {
        let task = Task::new("collect news and write a summary document", 3);
        let memory = MemoryStore::default();
        let proposed = vec![ToolCall::new(TOOL_SEARCH).with_arg("query", "world news")];
        match task.decide(&proposed, &memory) {
            Decision::Execute {
                call, synthesized, ..
            } => {
                assert!(!synthesized);
                assert_eq!(call.arg_str("query"), "world news");
            }
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_offtopic_call_is_overridden() {
        let task = Task::new("collect news and write a summary document", 3);
        let memory = MemoryStore::default();
        let proposed = vec![ToolCall::new(TOOL_NAVIGATE).with_arg("url", "https://x.com")];
        match task.decide(&proposed, &memory) {
            Decision::Execute {
                call, synthesized, ..
            } => {
                assert!(synthesized);
                assert_eq!(call.name, TOOL_SEARCH);
            }
            other => panic!("expected override, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_phase_follows_evidence() {
        let task = Task::new("save top news to a file", 3);
        let mut memory = MemoryStore::default();
        assert_eq!(task.pending_phase(&memory), Some(Phase::Search));
        evidence(&mut memory, Phase::Search, "1. Headline https://news.example.com/a");
        assert_eq!(task.pending_phase(&memory), Some(Phase::Extract));
        evidence(&mut memory, Phase::Extract, "article body text");
        assert_eq!(task.pending_phase(&memory), Some(Phase::Assemble));
        evidence(&mut memory, Phase::Assemble, "wrote assembled_document.md");
        assert_eq!(task.pending_phase(&memory), None);
        assert_eq!(task.decide(&[], &memory), Decision::Complete);
    }

    #[test]
    fn test_extract_override_reuses_search_result_url() {
        let task = Task::new("save top news to a file", 3);
        let mut memory = MemoryStore::default();
        evidence(&mut memory, Phase::Search, "see https://news.example.com/today");
        match task.decide(&[], &memory) {
            Decision::Execute { call, phase, .. } => {
                assert_eq!(phase, Phase::Extract);
                assert_eq!(call.arg_str("url"), "https://news.example.com/today");
            }
            other => panic!("expected extract override, got {:?}", other),
        }
    }

    #[test]
    fn test_assemble_override_carries_extract_evidence() {
        let task = Task::new("save top news to a file", 3);
        let mut memory = MemoryStore::default();
        evidence(&mut memory, Phase::Search, "results");
        evidence(&mut memory, Phase::Extract, "three major stories happened");
        match task.decide(&[], &memory) {
            Decision::Execute { call, phase, .. } => {
                assert_eq!(phase, Phase::Assemble);
                assert_eq!(call.name, TOOL_WRITE_FILE);
                assert!(call.arg_str("content").contains("three major stories happened"));
                assert_eq!(call.arg_str("path"), "assembled_document.md");
            }
            other => panic!("expected assemble override, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_budget_exhaustion_fails_permanently() {
        let mut task = Task::new("save top news to a file", 3);
        assert!(task.record_failure().is_ok());
        assert!(task.record_failure().is_ok());
        let err = task.record_failure().unwrap_err();
        assert!(matches!(err, AgentError::LoopDetected { .. }));
        assert_eq!(task.phase(), Phase::Failed);
        // 终态后裁决直接收口，不再产生任何调用
        let memory = MemoryStore::default();
        assert_eq!(task.decide(&[], &memory), Decision::Complete);
    }

    #[test]
    fn test_history_is_monotone() {
        let mut task = Task::new("save top news to a file", 3);
        task.record_success(Phase::Search);
        task.record_success(Phase::Extract);
        task.record_success(Phase::Assemble);
        task.finish();
        let h = task.history();
        assert!(h.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*h.last().unwrap(), Phase::Done);
    }

    #[test]
    fn test_conversation_shape_bypasses_machine() {
        let task = Task::new("what is rust?", 3);
        let memory = MemoryStore::default();
        assert_eq!(task.decide(&[], &memory), Decision::Respond);
    }

    #[test]
    fn test_success_resets_retry_counter() {
        let mut task = Task::new("save top news to a file", 3);
        assert!(task.record_failure().is_ok());
        assert!(task.record_failure().is_ok());
        task.record_success(Phase::Search);
        assert_eq!(task.retries(), 0);
        assert!(task.record_failure().is_ok());
    }
}
