//! 对话模型适配层
//!
//! 把一次 process 调用翻译为对 ConversationalModel 的调用，并把回复归一化为 ModelResponse：
//! 文本片段按顺序拼接，至多取一个函数调用，两者都没有时用占位语。
//! 后端失败（网络、配额、格式错误、超时）在这一层转为错误文本，不向上抛。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::{ModelResponse, ToolArguments, ToolRequest};
use crate::llm::{ConversationalModel, LlmError, RawReply, ReplyFragment};
use crate::memory::Turn;
use crate::tools::ToolCatalog;

pub const LIVE_TOKEN_PREFIX: &str = "gemini";
pub const RECEIPT_PLACEHOLDER: &str = "Processing your request...";
pub const BACKEND_ERROR_PREFIX: &str = "Error communicating with AI";

/// 不透明的确定性摘要令牌：`{prefix}_{16 位十六进制}`，仅用于比较与日志
pub fn digest_token(prefix: &str, raw: &str) -> String {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    format!("{}_{:016x}", prefix, hasher.finish())
}

/// 后端失败时返回给用户的文本
pub fn backend_error_content(err: &LlmError) -> String {
    format!("{}: {}", BACKEND_ERROR_PREFIX, err)
}

/// 函数参数转为字符串映射：字符串原样，null 丢弃，其余取 JSON 文本
fn to_tool_arguments(arguments: &Map<String, Value>) -> ToolArguments {
    arguments
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// 把原始回复折叠为 ModelResponse
pub fn fold_reply(reply: &RawReply) -> ModelResponse {
    let mut content = String::new();
    let mut tool_request: Option<ToolRequest> = None;

    for fragment in &reply.fragments {
        match fragment {
            ReplyFragment::Text(text) => content.push_str(text),
            ReplyFragment::FunctionCall { name, arguments } => {
                if tool_request.is_none() {
                    tracing::info!("Function call requested: {}", name);
                    tool_request = Some(ToolRequest::new(name.clone(), to_tool_arguments(arguments)));
                } else {
                    tracing::warn!("Ignoring additional function call in the same turn: {}", name);
                }
            }
        }
    }

    if content.is_empty() && tool_request.is_none() {
        content = RECEIPT_PLACEHOLDER.to_string();
    }

    ModelResponse {
        content,
        continuity_token: Some(digest_token(LIVE_TOKEN_PREFIX, &reply.raw)),
        tool_request,
    }
}

/// 适配器：持有可选的在线后端；启动时未启用则整个生命周期都不启用
#[derive(Clone)]
pub struct ModelAdapter {
    model: Option<Arc<dyn ConversationalModel>>,
    catalog: Arc<ToolCatalog>,
    timeout: Duration,
}

impl ModelAdapter {
    pub fn new(
        model: Option<Arc<dyn ConversationalModel>>,
        catalog: Arc<ToolCatalog>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            model,
            catalog,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 无在线后端（模拟模式）
    pub fn disabled(catalog: Arc<ToolCatalog>) -> Self {
        Self::new(None, catalog, 60)
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.model.as_ref().map(|m| m.name()).unwrap_or("simulation")
    }

    /// 提交历史并归一化回复；任何失败都转为错误文本
    pub async fn submit(&self, history: &[Turn]) -> ModelResponse {
        let Some(model) = self.model.as_ref() else {
            return ModelResponse::failure(format!(
                "{}: live backend is not configured",
                BACKEND_ERROR_PREFIX
            ));
        };

        let result = match tokio::time::timeout(self.timeout, model.send(history, &self.catalog)).await {
            Ok(r) => r,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        };

        match result {
            Ok(reply) => {
                tracing::debug!("Received response from {}", model.name());
                fold_reply(&reply)
            }
            Err(e) => {
                tracing::error!("Error processing input with {}: {}", model.name(), e);
                ModelResponse::failure(backend_error_content(&e))
            }
        }
    }
}
