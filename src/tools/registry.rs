//! 工具注册表
//!
//! 工具实现 Tool trait（name / execute），由 ToolRegistry 按名注册与查找；
//! 执行前按 ToolCatalog 校验工具名与必填参数，ToolExecutor 在调用时加超时。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AuditError, ToolArguments, ToolRequest};
use crate::storage::{DeviationReceipt, Severity};
use crate::tools::ToolCatalog;

/// 执行上下文：调用所在会话与该轮的延续令牌（随偏差一并记录）
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
    pub continuity_token: Option<String>,
}

/// 工具执行结果（结构化，由编排层格式化为文本）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    DeviationLogged {
        severity: Severity,
        description: String,
        recommended_action: String,
        receipt: DeviationReceipt,
    },
    Excerpts {
        query: String,
        excerpts: Vec<String>,
    },
}

/// 工具 trait：名称与异步执行（参数已通过必填校验）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（与 ToolCatalog 中的声明一致）
    fn name(&self) -> &str;

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext)
        -> Result<ToolOutput, AuditError>;
}

/// 工具注册表：声明表 + 按名称存储的 Arc<dyn Tool>
pub struct ToolRegistry {
    catalog: Arc<ToolCatalog>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            tools: HashMap::new(),
        }
    }

    /// 注册工具；未在声明表中的工具不会被模型看到，也无法通过校验
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if !self.catalog.contains(&name) {
            tracing::warn!("Tool '{}' registered without a declaration", name);
        }
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.catalog.contains(name) && self.tools.contains_key(name)
    }

    /// 校验后分发
    pub async fn execute(
        &self,
        request: &ToolRequest,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AuditError> {
        self.catalog.validate(&request.name, &request.arguments)?;
        let tool = self
            .tools
            .get(&request.name)
            .ok_or_else(|| AuditError::UnknownTool(request.name.clone()))?;
        tool.execute(&request.arguments, ctx).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SEARCH_KNOWLEDGE_VAULT;

    struct EchoSearch;

    #[async_trait]
    impl Tool for EchoSearch {
        fn name(&self) -> &str {
            SEARCH_KNOWLEDGE_VAULT
        }

        async fn execute(
            &self,
            args: &ToolArguments,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, AuditError> {
            let query = args.get("query").cloned().unwrap_or_default();
            Ok(ToolOutput::Excerpts {
                excerpts: vec![query.clone()],
                query,
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(Arc::new(ToolCatalog::standard()));
        registry.register(EchoSearch);
        registry
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_tool() {
        let registry = registry();
        let mut args = ToolArguments::new();
        args.insert("query".into(), "eyewear".into());
        let out = registry
            .execute(&ToolRequest::new(SEARCH_KNOWLEDGE_VAULT, args), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(
            out,
            ToolOutput::Excerpts {
                query: "eyewear".into(),
                excerpts: vec!["eyewear".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_declared_but_unregistered_is_unknown() {
        let registry = registry();
        assert!(!registry.is_known("log_deviation"));
        let mut args = ToolArguments::new();
        args.insert("severity".into(), "LOW".into());
        args.insert("description".into(), "x".into());
        args.insert("recommended_action".into(), "y".into());
        let err = registry
            .execute(&ToolRequest::new("log_deviation", args), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::UnknownTool(name) if name == "log_deviation"));
    }

    #[tokio::test]
    async fn test_missing_arguments_rejected_before_dispatch() {
        let registry = registry();
        let err = registry
            .execute(
                &ToolRequest::new(SEARCH_KNOWLEDGE_VAULT, ToolArguments::new()),
                &ToolContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::MissingArguments { .. }));
    }
}
