//! 工具结果与失败的文本呈现

use crate::core::AuditError;
use crate::tools::ToolOutput;

pub const NO_PROTOCOLS_FOUND: &str = "No matching protocols found in the Knowledge Vault.";

/// 工具结果 -> 面向用户的文本
pub fn format_tool_output(output: &ToolOutput) -> String {
    match output {
        ToolOutput::DeviationLogged {
            severity,
            description,
            recommended_action,
            receipt,
        } => format!(
            "\n{icon} **SAFETY DEVIATION LOGGED**\n\n\
             **Severity:** {severity}\n\
             **Issue:** {description}\n\
             **Action Required:** {recommended_action}\n\n\
             **Record ID:** #{id}\n\
             **Logged at:** {logged_at}\n",
            icon = severity.icon(),
            id = receipt.id,
            logged_at = receipt.timestamp.format("%Y-%m-%d %H:%M:%S"),
        ),
        ToolOutput::Excerpts { query, excerpts } => {
            if excerpts.is_empty() {
                return format!(
                    "📚 **KNOWLEDGE VAULT SEARCH**\n\n**Query:** {query}\n\n{NO_PROTOCOLS_FOUND}"
                );
            }
            let bullets = excerpts
                .iter()
                .map(|e| format!("  • {e}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "📚 **KNOWLEDGE VAULT SEARCH**\n\n**Query:** {query}\n\n**Relevant Protocols:**\n{bullets}"
            )
        }
    }
}

pub fn unknown_tool(name: &str) -> String {
    format!("❌ Error: Unknown tool '{name}'")
}

pub fn tool_failure(err: &AuditError) -> String {
    format!("❌ Tool execution error: {err}")
}

/// 最终消息：有工具结果时 content 与结果以空行相接；content 为空则只给结果
pub fn compose(content: &str, tool_result: Option<&str>) -> String {
    match tool_result {
        Some(result) if content.is_empty() => result.to_string(),
        Some(result) => format!("{content}\n\n{result}"),
        None => content.to_string(),
    }
}
