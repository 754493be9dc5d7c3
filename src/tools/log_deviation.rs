//! log_deviation 工具：把模型识别出的安全偏差写入 DeviationLog
//!
//! severity 大小写不敏感，统一转大写后写入；四个取值之外直接拒绝。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AuditError, ToolArguments};
use crate::storage::{DeviationLog, NewDeviation, Severity};
use crate::tools::{Tool, ToolContext, ToolOutput, LOG_DEVIATION};

pub struct LogDeviationTool {
    log: Arc<dyn DeviationLog>,
}

impl LogDeviationTool {
    pub fn new(log: Arc<dyn DeviationLog>) -> Self {
        Self { log }
    }
}

fn required<'a>(args: &'a ToolArguments, field: &str) -> Result<&'a str, AuditError> {
    args.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuditError::MissingArguments {
            tool: LOG_DEVIATION.to_string(),
            missing: field.to_string(),
        })
}

#[async_trait]
impl Tool for LogDeviationTool {
    fn name(&self) -> &str {
        LOG_DEVIATION
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AuditError> {
        let severity: Severity = required(args, "severity")?
            .parse()
            .map_err(|reason| AuditError::InvalidArgument {
                field: "severity".to_string(),
                reason,
            })?;
        let description = required(args, "description")?.to_string();
        let recommended_action = required(args, "recommended_action")?.to_string();

        let deviation = NewDeviation {
            severity,
            description: description.clone(),
            recommended_action: recommended_action.clone(),
            session_id: ctx.session_id.clone(),
            tool_signature: ctx.continuity_token.clone(),
        };
        tracing::info!(
            "[ANALYTICS] Deviation: [{}] {} -> {}",
            severity,
            description,
            recommended_action
        );
        let receipt = self.log.record(deviation).await?;

        Ok(ToolOutput::DeviationLogged {
            severity,
            description,
            recommended_action,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDeviationLog;

    fn args(severity: &str) -> ToolArguments {
        let mut args = ToolArguments::new();
        args.insert("severity".into(), severity.into());
        args.insert("description".into(), "Unsafe scalpel technique".into());
        args.insert("recommended_action".into(), "Halt procedure".into());
        args
    }

    #[tokio::test]
    async fn test_records_uppercased_severity_with_context() {
        let log = Arc::new(InMemoryDeviationLog::new());
        let tool = LogDeviationTool::new(log.clone());
        let ctx = ToolContext {
            session_id: Some("session_a".into()),
            continuity_token: Some("sim_0000000000000001".into()),
        };

        let out = tool.execute(&args("High"), &ctx).await.unwrap();
        match out {
            ToolOutput::DeviationLogged { severity, receipt, .. } => {
                assert_eq!(severity, Severity::High);
                assert_eq!(receipt.id, "dev_1");
            }
            other => panic!("Expected DeviationLogged, got {other:?}"),
        }

        let records = log.records();
        assert_eq!(records[0].severity, "HIGH");
        assert_eq!(records[0].session_id.as_deref(), Some("session_a"));
        assert_eq!(records[0].tool_signature.as_deref(), Some("sim_0000000000000001"));
    }

    #[tokio::test]
    async fn test_rejects_unknown_severity() {
        let log = Arc::new(InMemoryDeviationLog::new());
        let tool = LogDeviationTool::new(log.clone());
        let err = tool
            .execute(&args("Catastrophic"), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidArgument { ref field, .. } if field == "severity"));
        assert!(log.records().is_empty());
    }
}
