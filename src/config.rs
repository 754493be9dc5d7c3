//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AEGIS__*` 覆盖（双下划线表示嵌套，如 `AEGIS__LLM__PROVIDER=simulation`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub knowledge: KnowledgeSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

/// [app] 段：应用名、提交给后端的对话轮数上限
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 发送给在线后端的最近轮数；0 表示整段历史
    #[serde(default)]
    pub max_context_turns: usize,
}

/// [llm] 段：后端选择、密钥、系统指令与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini / simulation
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退到环境变量 GEMINI_API_KEY
    pub api_key: Option<String>,
    /// 覆盖内置的审计员系统指令
    pub system_prompt: Option<String>,
    /// 启动时探测一次后端，不可达则整个进程使用模拟模式
    #[serde(default)]
    pub verify_on_startup: bool,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            system_prompt: None,
            verify_on_startup: false,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}

impl LlmSection {
    /// 配置中的密钥优先，其次环境变量 GEMINI_API_KEY；空字符串视为未设置
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key_or(std::env::var("GEMINI_API_KEY").ok())
    }

    fn api_key_or(&self, fallback: Option<String>) -> Option<String> {
        let present = |k: &String| !k.trim().is_empty();
        self.api_key
            .clone()
            .filter(present)
            .or_else(|| fallback.filter(present))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [simulation] 段：离线模拟引擎参数
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    /// 默认确认语中回显输入的最大字符数
    #[serde(default = "default_ack_prefix_chars")]
    pub ack_prefix_chars: usize,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            ack_prefix_chars: default_ack_prefix_chars(),
        }
    }
}

fn default_ack_prefix_chars() -> usize {
    50
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [storage] 段：偏差记录数据库（":memory:" 表示不落盘）
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_deviation_db")]
    pub deviation_db: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            deviation_db: default_deviation_db(),
        }
    }
}

fn default_deviation_db() -> PathBuf {
    PathBuf::from("data/deviations.db")
}

/// [knowledge] 段：协议文档目录与返回片段上限
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeSection {
    /// 未设置时使用内置的基线协议片段
    pub vault_dir: Option<PathBuf>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            vault_dir: None,
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    5
}

/// [gateway] 段：WebSocket 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_ws_path")]
    pub path: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            path: default_ws_path(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_ws_path() -> String {
    "/ws/auditor/".to_string()
}

/// 从 config 目录加载配置，环境变量 AEGIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AEGIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AEGIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.simulation.ack_prefix_chars, 50);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.knowledge.max_results, 5);
        assert_eq!(cfg.gateway.bind_addr, "127.0.0.1:8000");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aegis.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"simulation\"\n\n[simulation]\nack_prefix_chars = 12\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "simulation");
        assert_eq!(cfg.simulation.ack_prefix_chars, 12);
        assert_eq!(cfg.llm.timeouts.request, 60);
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let section = LlmSection {
            api_key: Some("   ".to_string()),
            ..LlmSection::default()
        };
        assert!(section.api_key_or(None).is_none());
        assert!(section.api_key_or(Some(String::new())).is_none());
    }

    #[test]
    fn test_blank_api_key_falls_back_to_env() {
        let mut section = LlmSection {
            api_key: Some(String::new()),
            ..LlmSection::default()
        };
        assert_eq!(
            section.api_key_or(Some("env-key".to_string())).as_deref(),
            Some("env-key")
        );

        section.api_key = Some("file-key".to_string());
        assert_eq!(
            section.api_key_or(Some("env-key".to_string())).as_deref(),
            Some("file-key")
        );
    }
}
