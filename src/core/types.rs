//! 单轮处理的数据结构：模型回复与工具请求

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 工具参数：字段名 -> 字符串值（按键有序，便于日志与比较）
pub type ToolArguments = BTreeMap<String, String>;

/// 模型层发出的工具调用请求
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }
}

/// 一次提交的归一化结果；content 非空或 tool_request 存在，二者不会同时为空
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub continuity_token: Option<String>,
    pub tool_request: Option<ToolRequest>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>, continuity_token: Option<String>) -> Self {
        Self {
            content: content.into(),
            continuity_token,
            tool_request: None,
        }
    }

    pub fn with_tool(
        content: impl Into<String>,
        continuity_token: Option<String>,
        tool_request: ToolRequest,
    ) -> Self {
        Self {
            content: content.into(),
            continuity_token,
            tool_request: Some(tool_request),
        }
    }

    /// 后端失败时的回复：无工具请求、无延续令牌
    pub fn failure(content: impl Into<String>) -> Self {
        Self::text(content, None)
    }
}
