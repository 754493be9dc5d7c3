//! 会话编排器：一轮 = 提交 → 解释回复 →（执行工具）→ 组合最终消息
//!
//! 每个连接持有一个 Orchestrator，历史与延续令牌只归该实例所有；
//! 方法取 `&mut self`，同一会话的两轮无法交错。
//! 在线后端启动时未启用则每轮都走模拟引擎；后端与工具的任何失败都转成文本，不会结束会话。

use std::sync::Arc;

use crate::core::{report, AuditError, ModelResponse, ToolRequest, TurnPhase};
use crate::llm::{ModelAdapter, SimulationEngine};
use crate::memory::{ConversationHistory, Turn};
use crate::tools::{ToolContext, ToolExecutor};

/// handle_turn 的结果：发给客户端的消息与本轮令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub message: String,
    pub continuity_token: Option<String>,
    /// 本轮请求的工具（若有）
    pub tool_request: Option<ToolRequest>,
}

pub struct Orchestrator {
    session_id: String,
    history: ConversationHistory,
    continuity_token: Option<String>,
    phase: TurnPhase,
    adapter: ModelAdapter,
    simulation: Arc<SimulationEngine>,
    executor: Arc<ToolExecutor>,
    /// 提交给在线后端的最近轮数；0 表示整段历史
    max_context_turns: usize,
}

impl Orchestrator {
    pub fn new(
        session_id: impl Into<String>,
        adapter: ModelAdapter,
        simulation: Arc<SimulationEngine>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            history: ConversationHistory::new(),
            continuity_token: None,
            phase: TurnPhase::Idle,
            adapter,
            simulation,
            executor,
            max_context_turns: 0,
        }
    }

    pub fn with_max_context_turns(mut self, max_turns: usize) -> Self {
        self.max_context_turns = max_turns;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn continuity_token(&self) -> Option<&str> {
        self.continuity_token.as_deref()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.adapter.is_enabled()
    }

    fn advance(&mut self, next: TurnPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                session = %self.session_id,
                "Unexpected phase transition {:?} -> {:?}",
                self.phase,
                next
            );
        }
        tracing::debug!(session = %self.session_id, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// 提交一轮输入，返回归一化回复；历史追加 user 与 model 两条，令牌随之更新
    pub async fn process(&mut self, input: &str) -> ModelResponse {
        if !self.phase.is_idle() {
            // 上一轮请求了工具但调用方没有执行
            tracing::warn!(session = %self.session_id, "Previous turn left in {:?}", self.phase);
            self.phase = TurnPhase::Idle;
        }
        self.advance(TurnPhase::AwaitingModel);
        self.history.push(Turn::user(input));

        let response = if self.adapter.is_enabled() {
            self.adapter
                .submit(self.history.window(self.max_context_turns))
                .await
        } else {
            self.simulation.classify(input)
        };

        self.history.push(Turn::model(response.content.clone()));
        self.continuity_token = response.continuity_token.clone();

        if response.tool_request.is_some() {
            self.advance(TurnPhase::ToolRequested);
        } else {
            self.advance(TurnPhase::Composing);
            self.advance(TurnPhase::Idle);
        }
        response
    }

    /// 执行工具请求，返回格式化结果；未知工具与执行失败都返回错误文本
    pub async fn execute(&mut self, request: &ToolRequest) -> String {
        let in_turn = self.phase == TurnPhase::ToolRequested;
        if in_turn {
            self.advance(TurnPhase::ExecutingTool);
        }

        let text = self.run_tool(request).await;

        if in_turn {
            self.advance(TurnPhase::Composing);
            self.advance(TurnPhase::Idle);
        }
        text
    }

    async fn run_tool(&self, request: &ToolRequest) -> String {
        if !self.executor.is_known(&request.name) {
            tracing::warn!(session = %self.session_id, tool = %request.name, "Unknown tool requested");
            return report::unknown_tool(&request.name);
        }

        let ctx = ToolContext {
            session_id: Some(self.session_id.clone()),
            continuity_token: self.continuity_token.clone(),
        };
        match self.executor.execute(request, &ctx).await {
            Ok(output) => report::format_tool_output(&output),
            Err(AuditError::UnknownTool(name)) => report::unknown_tool(&name),
            Err(e) => {
                tracing::error!(session = %self.session_id, tool = %request.name, "Tool failed: {}", e);
                report::tool_failure(&e)
            }
        }
    }

    /// 完整一轮：process，若有工具请求则 execute，再组合最终消息
    pub async fn handle_turn(&mut self, input: &str) -> TurnOutcome {
        let response = self.process(input).await;
        let tool_result = match &response.tool_request {
            Some(request) => Some(self.execute(request).await),
            None => None,
        };

        TurnOutcome {
            message: report::compose(&response.content, tool_result.as_deref()),
            continuity_token: response.continuity_token,
            tool_request: response.tool_request,
        }
    }
}
