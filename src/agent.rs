//! Agent 运行时装配
//!
//! create_components 从配置构建共享组件（LLM 客户端、工具执行器、路由器、恢复引擎），
//! 多会话共享；process_request 是唯一对外调用：路由 → 工作者步循环 → 最终回复。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryEngine, Session};
use crate::llm::{LlmClient, OpenAiClient};
use crate::memory::Message;
use crate::router::{Router, WorkerKind};
use crate::tools::{self, ToolExecutor};
use crate::worker::{system_prompt_for, Worker};

/// 预构建的共享组件：LLM、执行器、路由器、恢复引擎与配置视图
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub router: Router,
    pub recovery: RecoveryEngine,
    pub config: AppConfig,
}

/// 从配置构建全套组件（OpenAI 兼容后端）
pub fn create_components(config: AppConfig) -> AgentComponents {
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
        config.llm.base_url.as_deref(),
        &config.llm.model,
        None,
    ));
    create_components_with_llm(config, llm)
}

/// 注入自定义 LLM 客户端（测试用脚本客户端等）
pub fn create_components_with_llm(config: AppConfig, llm: Arc<dyn LlmClient>) -> AgentComponents {
    let executor = tools::build_executor(&config.app, &config.tools);
    AgentComponents {
        llm,
        executor,
        router: Router::new(config.router.clone()),
        recovery: RecoveryEngine::new(),
        config,
    }
}

/// 按配置的记忆预算开一个新会话，种子提示词列出全部可用工具
pub fn new_session(components: &AgentComponents) -> Session {
    Session::with_limits(
        &system_prompt_for(WorkerKind::General, &components.executor),
        components.config.memory.soft_limit_tokens,
        components.config.memory.hard_limit_tokens,
    )
}

/// 处理一条用户请求：丢弃终态任务 → 路由（复用或重置）→ 工作者驱动到终局
pub async fn process_request(
    components: &AgentComponents,
    session: &mut Session,
    text: &str,
) -> Result<String, AgentError> {
    session.drop_finished_task();
    let prior_kind = session.assignment.map(|a| a.kind);
    let assignment = components.router.route(session, text);
    if prior_kind != Some(assignment.kind) {
        // 工作者类别变更：路由器已重置记忆，换上该类别的种子提示词
        session.memory.set_messages(vec![Message::system(system_prompt_for(
            assignment.kind,
            &components.executor,
        ))]);
    }
    tracing::debug!(session_id = %session.id, kind = ?assignment.kind, "request routed");
    let worker = Worker::new(
        assignment.kind,
        components.llm.as_ref(),
        &components.executor,
        &components.recovery,
        &components.config,
    );
    worker.run(session, text).await
}
