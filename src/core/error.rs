//! 审计错误类型
//!
//! 模型后端与工具协作方的失败都在编排层转为文本回复，不会终止会话；
//! 只有传输层（连接已关闭）允许结束会话。

use thiserror::Error;

use crate::storage::StorageError;

/// 审计流程中可能出现的错误
#[derive(Error, Debug)]
pub enum AuditError {
    /// 后端未配置或配置错误：整个进程回退到模拟引擎
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument(s) for {tool}: {missing}")]
    MissingArguments { tool: String, missing: String },

    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
