//! 对话模型抽象
//!
//! 所有在线后端实现 ConversationalModel：send(history, tools) 返回原始回复，
//! 回复由若干片段组成，每个片段要么是文本，要么是一次函数调用。

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::memory::Turn;
use crate::tools::ToolCatalog;

/// 后端调用失败（网络、配额、回复格式错误）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

/// 回复片段：文本与函数调用互斥
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyFragment {
    Text(String),
    FunctionCall {
        name: String,
        arguments: Map<String, Value>,
    },
}

/// 后端原始回复：有序片段 + 原始报文（用于生成延续令牌）
#[derive(Clone, Debug, Default)]
pub struct RawReply {
    pub fragments: Vec<ReplyFragment>,
    pub raw: String,
}

impl RawReply {
    pub fn new(fragments: Vec<ReplyFragment>, raw: impl Into<String>) -> Self {
        Self {
            fragments,
            raw: raw.into(),
        }
    }
}

/// 对话模型能力：提交整段历史与声明的工具，返回一次回复
#[async_trait]
pub trait ConversationalModel: Send + Sync {
    /// 后端名称（日志与诊断用）
    fn name(&self) -> &str;

    async fn send(&self, history: &[Turn], tools: &ToolCatalog) -> Result<RawReply, LlmError>;

    /// 连通性探测；默认视为可用
    async fn ping(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
