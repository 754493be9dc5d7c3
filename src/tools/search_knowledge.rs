//! search_knowledge_vault 工具：查询协议知识库

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AuditError, ToolArguments};
use crate::knowledge::KnowledgeRepository;
use crate::tools::{Tool, ToolContext, ToolOutput, SEARCH_KNOWLEDGE_VAULT};

pub struct SearchKnowledgeTool {
    repository: Arc<dyn KnowledgeRepository>,
}

impl SearchKnowledgeTool {
    pub fn new(repository: Arc<dyn KnowledgeRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        SEARCH_KNOWLEDGE_VAULT
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, AuditError> {
        let query = args
            .get("query")
            .map(|q| q.trim().to_string())
            .unwrap_or_default();
        let excerpts = self
            .repository
            .search(&query)
            .await
            .map_err(|e| AuditError::ToolExecution(e.to_string()))?;
        Ok(ToolOutput::Excerpts { query, excerpts })
    }
}
