//! 离线模拟引擎（无在线后端时使用）
//!
//! 按固定顺序检查关键词规则，首个命中的规则生成工具请求；都不命中则回一条确认语。
//! 结果只取决于输入文本。

use crate::core::{ModelResponse, ToolArguments, ToolRequest};
use crate::llm::adapter::digest_token;
use crate::tools::{LOG_DEVIATION, SEARCH_KNOWLEDGE_VAULT};

pub const SIMULATION_TOKEN_PREFIX: &str = "sim";

pub const DEVIATION_ACK: &str = "⚠️ I have detected a critical safety risk and will log a deviation.";
pub const DEVIATION_ACTION: &str = "Halt procedure immediately and inspect.";
pub const PROTOCOL_ACK: &str = "🔍 Consulting the Knowledge Vault for relevant protocols...";

/// 单条规则：任一关键词出现在小写输入中即命中
pub struct Rule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    build: fn(&str) -> (String, ToolRequest),
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }
}

fn deviation_rule(input: &str) -> (String, ToolRequest) {
    let mut args = ToolArguments::new();
    args.insert("severity".into(), "High".into());
    args.insert(
        "description".into(),
        format!("Detected potential safety violation in: {input}"),
    );
    args.insert("recommended_action".into(), DEVIATION_ACTION.into());
    (DEVIATION_ACK.to_string(), ToolRequest::new(LOG_DEVIATION, args))
}

fn protocol_rule(input: &str) -> (String, ToolRequest) {
    let mut args = ToolArguments::new();
    args.insert("query".into(), input.to_string());
    (
        PROTOCOL_ACK.to_string(),
        ToolRequest::new(SEARCH_KNOWLEDGE_VAULT, args),
    )
}

/// 模拟引擎：有序规则表 + 默认确认语
pub struct SimulationEngine {
    rules: Vec<Rule>,
    ack_prefix_chars: usize,
}

impl SimulationEngine {
    pub fn new(ack_prefix_chars: usize) -> Self {
        Self {
            rules: vec![
                Rule {
                    name: "safety_violation",
                    keywords: &["unsafe", "violation"],
                    build: deviation_rule,
                },
                Rule {
                    name: "protocol_lookup",
                    keywords: &["protocol"],
                    build: protocol_rule,
                },
            ],
            ack_prefix_chars,
        }
    }

    /// 默认确认语：回显输入的前 ack_prefix_chars 个字符
    pub fn acknowledgment(&self, input: &str) -> String {
        let prefix: String = input.chars().take(self.ack_prefix_chars).collect();
        format!("✅ Acknowledged. Monitoring stream: {prefix}...")
    }

    pub fn classify(&self, input: &str) -> ModelResponse {
        let token = Some(digest_token(SIMULATION_TOKEN_PREFIX, input));
        let lowered = input.to_lowercase();

        match self.rules.iter().find(|r| r.matches(&lowered)) {
            Some(rule) => {
                let (content, request) = (rule.build)(input);
                tracing::debug!(rule = rule.name, tool = %request.name, "simulation rule matched");
                ModelResponse::with_tool(content, token, request)
            }
            None => ModelResponse::text(self.acknowledgment(input), token),
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(50)
    }
}
