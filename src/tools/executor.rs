//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(request, ctx) 在超时内调用 registry.execute，
//! 超时转为 AuditError::ToolTimeout；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{AuditError, ToolRequest};
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 执行指定工具；超时返回 ToolTimeout，其余错误原样返回；输出 JSON 审计日志
    pub async fn execute(
        &self,
        request: &ToolRequest,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AuditError> {
        let start = Instant::now();
        let args_preview = args_preview(request);
        let result = timeout(self.timeout, self.registry.execute(request, ctx)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "session": ctx.session_id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AuditError::ToolTimeout(request.name.clone())),
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.registry.is_known(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(request: &ToolRequest) -> String {
    let s = serde_json::to_string(&request.arguments).unwrap_or_default();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
