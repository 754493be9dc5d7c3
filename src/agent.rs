//! 审计运行时组件
//!
//! AuditComponents 在启动时构建一次：工具声明表、在线后端（可能没有）、偏差记录、协议知识库、
//! 工具执行器与模拟引擎，全部以 Arc 在会话间共享；每个连接通过 new_orchestrator 得到自己的编排器。
//! 后端未配置或启动探测失败属于配置错误：记录 warn，整个进程使用模拟模式。

use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::core::{AuditError, Orchestrator};
use crate::knowledge::{KnowledgeRepository, KnowledgeVault, StaticKnowledgeRepository};
use crate::llm::{ConversationalModel, GeminiClient, ModelAdapter, SimulationEngine};
use crate::storage::{DeviationLog, InMemoryDeviationLog, SqliteDeviationLog};
use crate::tools::{
    LogDeviationTool, SearchKnowledgeTool, ToolCatalog, ToolExecutor, ToolRegistry,
};

pub const STATUS_LIVE: &str = "Aegis Core Auditor Connected - Gemini AI Active";
pub const STATUS_SIMULATION: &str = "Aegis Core Auditor Connected - Simulation Mode";

/// 预构建的审计组件，可多会话共享
pub struct AuditComponents {
    pub catalog: Arc<ToolCatalog>,
    pub adapter: ModelAdapter,
    pub simulation: Arc<SimulationEngine>,
    pub executor: Arc<ToolExecutor>,
    pub max_context_turns: usize,
}

/// 按配置选择在线后端；返回 None 表示模拟模式
pub async fn create_model_from_config(cfg: &AppConfig) -> Option<Arc<dyn ConversationalModel>> {
    match select_model(cfg).await {
        Ok(model) => {
            tracing::info!("Using Gemini backend ({})", cfg.llm.model);
            Some(model)
        }
        Err(e) => {
            tracing::warn!("{}; running in simulation mode", e);
            None
        }
    }
}

async fn select_model(cfg: &AppConfig) -> Result<Arc<dyn ConversationalModel>, AuditError> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "simulation" {
        return Err(AuditError::Configuration(
            "provider set to simulation".to_string(),
        ));
    }
    if provider != "gemini" {
        return Err(AuditError::Configuration(format!(
            "unknown provider '{}'",
            cfg.llm.provider
        )));
    }
    let api_key = cfg.llm.resolve_api_key().ok_or_else(|| {
        AuditError::Configuration("GEMINI_API_KEY not set".to_string())
    })?;

    let client = GeminiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        &api_key,
        cfg.llm.system_prompt.as_deref(),
        cfg.llm.timeouts.request,
    )
    .map_err(|e| AuditError::Configuration(format!("failed to build Gemini client: {e}")))?;

    if cfg.llm.verify_on_startup {
        client
            .ping()
            .await
            .map_err(|e| AuditError::Configuration(format!("Gemini backend unreachable: {e}")))?;
    }
    Ok(Arc::new(client))
}

/// 协议知识库：配置了 vault_dir 则导入目录，否则使用基线片段
pub fn create_knowledge_from_config(cfg: &AppConfig) -> anyhow::Result<Arc<dyn KnowledgeRepository>> {
    match &cfg.knowledge.vault_dir {
        Some(dir) => {
            let vault = KnowledgeVault::new(cfg.knowledge.max_results);
            let documents = vault
                .ingest_dir(dir)
                .with_context(|| format!("failed to ingest knowledge vault {}", dir.display()))?;
            tracing::info!(
                "Knowledge Vault ready: {} documents, {} passages",
                documents,
                vault.passage_count()
            );
            Ok(Arc::new(vault))
        }
        None => {
            tracing::info!("No vault_dir configured, using baseline protocol excerpts");
            Ok(Arc::new(StaticKnowledgeRepository::baseline()))
        }
    }
}

impl AuditComponents {
    /// 从配置构建全部组件（偏差库打不开视为启动失败）
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let model = create_model_from_config(cfg).await;
        let deviation_log = SqliteDeviationLog::open(&cfg.storage.deviation_db).with_context(|| {
            format!(
                "failed to open deviation log {}",
                cfg.storage.deviation_db.display()
            )
        })?;
        let knowledge = create_knowledge_from_config(cfg)?;

        Ok(Self::builder(cfg)
            .model(model)
            .deviation_log(Arc::new(deviation_log))
            .knowledge(knowledge)
            .build())
    }

    pub fn builder(cfg: &AppConfig) -> AuditComponentsBuilder {
        AuditComponentsBuilder {
            model: None,
            deviation_log: None,
            knowledge: None,
            request_timeout_secs: cfg.llm.timeouts.request,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            ack_prefix_chars: cfg.simulation.ack_prefix_chars,
            max_context_turns: cfg.app.max_context_turns,
        }
    }

    pub fn is_live(&self) -> bool {
        self.adapter.is_enabled()
    }

    /// 连接建立时发给客户端的状态文本
    pub fn status_text(&self) -> &'static str {
        if self.is_live() {
            STATUS_LIVE
        } else {
            STATUS_SIMULATION
        }
    }

    pub fn new_orchestrator(&self, session_id: impl Into<String>) -> Orchestrator {
        Orchestrator::new(
            session_id,
            self.adapter.clone(),
            self.simulation.clone(),
            self.executor.clone(),
        )
        .with_max_context_turns(self.max_context_turns)
    }
}

/// 组件构建器：测试中注入 Mock 模型与内存协作方
pub struct AuditComponentsBuilder {
    model: Option<Arc<dyn ConversationalModel>>,
    deviation_log: Option<Arc<dyn DeviationLog>>,
    knowledge: Option<Arc<dyn KnowledgeRepository>>,
    request_timeout_secs: u64,
    tool_timeout_secs: u64,
    ack_prefix_chars: usize,
    max_context_turns: usize,
}

impl AuditComponentsBuilder {
    pub fn model(mut self, model: Option<Arc<dyn ConversationalModel>>) -> Self {
        self.model = model;
        self
    }

    pub fn deviation_log(mut self, log: Arc<dyn DeviationLog>) -> Self {
        self.deviation_log = Some(log);
        self
    }

    pub fn knowledge(mut self, knowledge: Arc<dyn KnowledgeRepository>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// 未注入的协作方：内存偏差记录与基线知识库
    pub fn build(self) -> AuditComponents {
        let catalog = Arc::new(ToolCatalog::standard());
        tracing::debug!("Declared tools: {:?}", catalog.names());
        let deviation_log: Arc<dyn DeviationLog> = match self.deviation_log {
            Some(log) => log,
            None => Arc::new(InMemoryDeviationLog::new()),
        };
        let knowledge: Arc<dyn KnowledgeRepository> = match self.knowledge {
            Some(knowledge) => knowledge,
            None => Arc::new(StaticKnowledgeRepository::baseline()),
        };

        let mut registry = ToolRegistry::new(catalog.clone());
        registry.register(LogDeviationTool::new(deviation_log));
        registry.register(SearchKnowledgeTool::new(knowledge));

        AuditComponents {
            adapter: ModelAdapter::new(self.model, catalog.clone(), self.request_timeout_secs),
            catalog,
            simulation: Arc::new(SimulationEngine::new(self.ack_prefix_chars)),
            executor: Arc::new(ToolExecutor::new(registry, self.tool_timeout_secs)),
            max_context_turns: self.max_context_turns,
        }
    }
}
