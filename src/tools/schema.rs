//! 工具声明（schemars 从参数结构体自动生成参数 Schema）
//!
//! ToolCatalog 在启动时构建一次，之后只读；同一份声明既发给后端（函数声明），
//! 也用于执行前的必填参数校验。

use std::collections::BTreeMap;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::{AuditError, ToolArguments};

pub const LOG_DEVIATION: &str = "log_deviation";
pub const SEARCH_KNOWLEDGE_VAULT: &str = "search_knowledge_vault";

/// log_deviation 的参数（字段注释即发给模型的参数说明）
#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogDeviationArgs {
    /// Severity level of the deviation. Must be one of: LOW, MEDIUM, HIGH, or CRITICAL
    pub severity: String,
    /// Detailed description of the safety deviation, including what was observed and why it's a concern
    pub description: String,
    /// Immediate corrective action required to address the deviation
    pub recommended_action: String,
}

/// search_knowledge_vault 的参数
#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchKnowledgeArgs {
    /// The specific safety topic, procedure, or regulation to look up
    pub query: String,
}

/// 单个工具的声明：名称、描述、参数 Schema（object）与必填字段
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub required: Vec<String>,
}

impl ToolSchema {
    /// 由参数结构体生成：只保留 properties / required，去掉 $schema、title 等后端不认识的键
    pub fn from_args<T: JsonSchema>(name: &str, description: &str) -> Self {
        let root = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
        let properties = root
            .get("properties")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let required: Vec<String> = root
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
            required,
        }
    }

    /// 给某个字符串字段加上枚举取值
    pub fn with_enum(mut self, field: &str, values: &[&str]) -> Self {
        if let Some(prop) = self
            .parameters
            .get_mut("properties")
            .and_then(|p| p.get_mut(field))
            .and_then(|p| p.as_object_mut())
        {
            prop.insert("format".into(), json!("enum"));
            prop.insert("enum".into(), json!(values));
        }
        self
    }

    /// 缺失（或为空白）的必填字段，按声明顺序
    pub fn missing_fields(&self, args: &ToolArguments) -> Vec<String> {
        self.required
            .iter()
            .filter(|field| args.get(*field).map_or(true, |v| v.trim().is_empty()))
            .cloned()
            .collect()
    }
}

/// 不可变的工具声明表：name -> ToolSchema
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    schemas: BTreeMap<String, ToolSchema>,
}

impl ToolCatalog {
    /// 两个固定工具
    pub fn standard() -> Self {
        let log_deviation = ToolSchema::from_args::<LogDeviationArgs>(
            LOG_DEVIATION,
            "Logs a detected safety deviation or regulatory non-conformance to the database. \
             Use this when you detect unsafe conditions, protocol violations, or regulatory non-compliance.",
        )
        .with_enum("severity", &["LOW", "MEDIUM", "HIGH", "CRITICAL"]);

        let search = ToolSchema::from_args::<SearchKnowledgeArgs>(
            SEARCH_KNOWLEDGE_VAULT,
            "Queries the safety protocols and legal regulations database. \
             Use this to look up specific procedures, standards, or regulatory requirements.",
        );

        Self::from_schemas(vec![log_deviation, search])
    }

    pub fn from_schemas(schemas: Vec<ToolSchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.schemas.values()
    }

    /// 执行前校验：工具已声明且必填参数齐全
    pub fn validate(&self, name: &str, args: &ToolArguments) -> Result<(), AuditError> {
        let schema = self
            .get(name)
            .ok_or_else(|| AuditError::UnknownTool(name.to_string()))?;
        let missing = schema.missing_fields(args);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuditError::MissingArguments {
                tool: name.to_string(),
                missing: missing.join(", "),
            })
        }
    }
}
