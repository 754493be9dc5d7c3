//! Mock 对话模型（用于测试，无需 API）
//!
//! 按脚本依次返回预设回复；脚本用完后回显最后一条 user 消息。同时记录每次收到的历史。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ConversationalModel, LlmError, RawReply, ReplyFragment};
use crate::memory::{Role, Turn};
use crate::tools::ToolCatalog;

/// Mock 模型：脚本回复 + 回显兜底
#[derive(Default)]
pub struct MockModel {
    script: Mutex<VecDeque<Result<RawReply, LlmError>>>,
    /// 设置后脚本用完时一直返回该错误
    persistent_error: Option<LlmError>,
    received: Mutex<Vec<Vec<Turn>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: Vec<Result<RawReply, LlmError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// 每次调用都失败
    pub fn failing(err: LlmError) -> Self {
        Self {
            persistent_error: Some(err),
            ..Self::default()
        }
    }

    /// 每次调用收到的历史（按调用顺序）
    pub fn received(&self) -> Vec<Vec<Turn>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ConversationalModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, history: &[Turn], _tools: &ToolCatalog) -> Result<RawReply, LlmError> {
        let call_index = {
            let mut received = self
                .received
                .lock()
                .map_err(|_| LlmError::Malformed("mock poisoned".into()))?;
            received.push(history.to_vec());
            received.len()
        };

        let scripted = self
            .script
            .lock()
            .map_err(|_| LlmError::Malformed("mock poisoned".into()))?
            .pop_front();
        if let Some(reply) = scripted {
            return reply;
        }
        if let Some(err) = &self.persistent_error {
            return Err(err.clone());
        }

        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or("(no input)");
        let text = format!("Echo from Mock: {}", last_user);
        Ok(RawReply::new(
            vec![ReplyFragment::Text(text.clone())],
            format!("mock#{}:{}", call_index, text),
        ))
    }
}
