//! 连接上的 JSON 消息格式
//!
//! 入站：`{"message": "..."}`；出站按 `type` 区分三种消息。

use serde::{Deserialize, Serialize};

/// 客户端提交的一轮输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub message: Option<String>,
}

impl InboundMessage {
    /// 解析一帧文本：非 JSON 返回错误；message 缺失或为空返回 Ok(None)
    pub fn parse(text: &str) -> Result<Option<String>, serde_json::Error> {
        let inbound: InboundMessage = serde_json::from_str(text)?;
        Ok(inbound.message.filter(|m| !m.is_empty()))
    }
}

/// 发往客户端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// 连接建立后发送一次，说明当前是在线后端还是模拟模式
    ConnectionEstablished { message: String },
    AuditResponse {
        message: String,
        /// 本轮的延续令牌；后端失败时为 null
        thought_signature: Option<String>,
    },
    Error { message: String },
}

impl OutboundMessage {
    pub fn connection_established(message: impl Into<String>) -> Self {
        Self::ConnectionEstablished {
            message: message.into(),
        }
    }

    pub fn audit_response(message: impl Into<String>, thought_signature: Option<String>) -> Self {
        Self::AuditResponse {
            message: message.into(),
            thought_signature,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_inbound_parse() {
        assert_eq!(
            InboundMessage::parse(r#"{"message": "check gloves"}"#).unwrap(),
            Some("check gloves".to_string())
        );
        assert_eq!(InboundMessage::parse(r#"{"message": ""}"#).unwrap(), None);
        assert_eq!(InboundMessage::parse(r#"{"other": 1}"#).unwrap(), None);
        assert_eq!(InboundMessage::parse(r#"{"message": null}"#).unwrap(), None);
        assert!(InboundMessage::parse("not json").is_err());
    }

    #[test]
    fn test_outbound_shapes() {
        let v: Value = serde_json::from_str(
            &OutboundMessage::audit_response("ok", Some("sim_00".into())).to_json(),
        )
        .unwrap();
        assert_eq!(
            v,
            json!({"type": "audit_response", "message": "ok", "thought_signature": "sim_00"})
        );

        let v: Value =
            serde_json::from_str(&OutboundMessage::audit_response("err", None).to_json()).unwrap();
        assert_eq!(v["thought_signature"], Value::Null);

        let v: Value =
            serde_json::from_str(&OutboundMessage::connection_established("hi").to_json()).unwrap();
        assert_eq!(v, json!({"type": "connection_established", "message": "hi"}));

        let v: Value = serde_json::from_str(&OutboundMessage::error("bad").to_json()).unwrap();
        assert_eq!(v, json!({"type": "error", "message": "bad"}));
    }
}
