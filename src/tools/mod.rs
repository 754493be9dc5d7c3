pub mod executor;
pub mod log_deviation;
pub mod registry;
pub mod schema;
pub mod search_knowledge;

pub use executor::ToolExecutor;
pub use log_deviation::LogDeviationTool;
pub use registry::{Tool, ToolContext, ToolOutput, ToolRegistry};
pub use schema::{
    LogDeviationArgs, SearchKnowledgeArgs, ToolCatalog, ToolSchema, LOG_DEVIATION,
    SEARCH_KNOWLEDGE_VAULT,
};
pub use search_knowledge::SearchKnowledgeTool;
