//! Gemini 客户端（generateContent + 函数声明）
//!
//! 通过 reqwest 调用 Generative Language REST 接口：每次提交系统指令、整段历史与两个工具的函数声明；
//! 回复中的每个 part 要么是文本，要么是一次 functionCall，思考片段（thought）被忽略。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::llm::{ConversationalModel, LlmError, RawReply, ReplyFragment};
use crate::memory::{Role, Turn};
use crate::tools::{ToolCatalog, ToolSchema};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 内置审计员系统指令
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are AEGIS (Advanced Evaluation and Governance Intelligence System), an AI safety auditor monitoring high-stakes operations in real-time.

Your role and responsibilities:
- Analyze video, audio, and text inputs for safety violations and regulatory non-compliance
- Cross-reference observed actions against established safety protocols and regulations
- Log deviations with appropriate severity ratings (LOW, MEDIUM, HIGH, CRITICAL)
- Provide clear, actionable recommendations for corrective actions
- Maintain professional, precise communication focused on safety

You have access to specialized tools:
- log_deviation: Record safety violations to the analytics database with severity and recommendations
- search_knowledge_vault: Query the regulatory protocols and safety standards database

Guidelines:
- Prioritize safety above all else
- Be specific and factual in your assessments
- Use tools proactively when you detect issues or need protocol information
- Provide context and reasoning for your decisions
- Maintain a professional, authoritative tone

Remember: Lives may depend on your accurate and timely analysis.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    tools: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// 将 JSON Schema 中的 type 值转为 Gemini 的大写枚举（STRING / OBJECT ...）
fn to_gemini_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let converted = match (k.as_str(), v) {
                        ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                        _ => to_gemini_schema(v),
                    };
                    (k.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

fn function_declaration(schema: &ToolSchema) -> Value {
    json!({
        "name": schema.name,
        "description": schema.description,
        "parameters": to_gemini_schema(&schema.parameters),
    })
}

/// 回复 parts -> 片段：functionCall 优先，其次文本；思考片段与空 part 跳过
fn parts_to_fragments(parts: Vec<Part>) -> Vec<ReplyFragment> {
    parts
        .into_iter()
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| match (p.function_call, p.text) {
            (Some(call), _) => Some(ReplyFragment::FunctionCall {
                name: call.name,
                arguments: call.args,
            }),
            (None, Some(text)) => Some(ReplyFragment::Text(text)),
            (None, None) => None,
        })
        .collect()
}

/// 解析 generateContent 的响应体
fn parse_reply(body: &str) -> Result<RawReply, LlmError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;

    if parsed.candidates.is_empty() {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Malformed(format!("prompt blocked: {reason}")));
        }
    }

    let parts = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();
    Ok(RawReply::new(parts_to_fragments(parts), body))
}

/// Gemini 客户端：持有 reqwest Client、模型名与密钥
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    system_instruction: String,
}

impl GeminiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        system_instruction: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            system_instruction: system_instruction
                .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION)
                .to_string(),
        })
    }

    fn build_request(&self, history: &[Turn], tools: &ToolCatalog) -> GenerateContentRequest {
        let contents = history
            .iter()
            .filter(|t| !t.content.trim().is_empty())
            .skip_while(|t| t.role == Role::Model)
            .map(|t| Content {
                role: Some(t.role.as_str().to_string()),
                parts: vec![Part::text(t.content.clone())],
            })
            .collect();
        let declarations: Vec<Value> = tools.iter().map(function_declaration).collect();

        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(self.system_instruction.clone())],
            },
            contents,
            tools: vec![json!({ "functionDeclarations": declarations })],
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    LlmError::Network(e.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await.map_err(map_transport_error)?;
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::Quota(body));
    }
    if !status.is_success() {
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl ConversationalModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, history: &[Turn], tools: &ToolCatalog) -> Result<RawReply, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self.build_request(history, tools);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = check_status(response).await?;
        parse_reply(&body)
    }

    async fn ping(&self) -> Result<(), LlmError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_call_parts() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking...", "thought": true},
                        {"text": "Unsafe handling observed. "},
                        {"functionCall": {"name": "log_deviation", "args": {"severity": "HIGH", "description": "d", "recommended_action": "a"}}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.fragments.len(), 2);
        assert_eq!(
            reply.fragments[0],
            ReplyFragment::Text("Unsafe handling observed. ".into())
        );
        match &reply.fragments[1] {
            ReplyFragment::FunctionCall { name, arguments } => {
                assert_eq!(name, "log_deviation");
                assert_eq!(arguments["severity"], "HIGH");
            }
            other => panic!("Expected FunctionCall, got {other:?}"),
        }
        assert_eq!(reply.raw, body);
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#;
        assert_eq!(
            parse_reply(body).unwrap_err(),
            LlmError::Malformed("prompt blocked: SAFETY".into())
        );
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(parse_reply("<html>"), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn test_parse_empty_candidate() {
        let reply = parse_reply(r#"{"candidates": [{"finishReason": "STOP"}]}"#).unwrap();
        assert!(reply.fragments.is_empty());
    }

    #[test]
    fn test_request_shape() {
        let client = GeminiClient::new(None, "gemini-1.5-pro", "k", None, 5).unwrap();
        let history = vec![
            Turn::model("left over from a trimmed window"),
            Turn::user("Is the field sterile?"),
            Turn::model(""),
            Turn::user("Check protocol"),
        ];
        let request = client.build_request(&history, &ToolCatalog::standard());
        let value = serde_json::to_value(&request).unwrap();

        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["parts"][0]["text"], "Check protocol");
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are AEGIS"));
        assert!(value["systemInstruction"].get("role").is_none());

        let decls = value["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0]["parameters"]["type"], "OBJECT");
        assert_eq!(
            decls[0]["parameters"]["properties"]["severity"]["type"],
            "STRING"
        );
    }
}
