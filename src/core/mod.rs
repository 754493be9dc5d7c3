//! 核心编排层：错误分类、阶段状态机、回复数据结构、结果呈现与会话编排器

pub mod error;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod types;

pub use error::AuditError;
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use state::TurnPhase;
pub use types::{ModelResponse, ToolArguments, ToolRequest};
