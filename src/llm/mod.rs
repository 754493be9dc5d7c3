//! LLM 层：对话模型抽象、Gemini 客户端、离线模拟引擎与 Mock

pub mod adapter;
pub mod gemini;
pub mod mock;
pub mod simulation;
pub mod traits;

pub use adapter::{
    backend_error_content, digest_token, fold_reply, ModelAdapter, BACKEND_ERROR_PREFIX,
    LIVE_TOKEN_PREFIX, RECEIPT_PLACEHOLDER,
};
pub use gemini::{GeminiClient, DEFAULT_SYSTEM_INSTRUCTION, GEMINI_BASE_URL};
pub use mock::MockModel;
pub use simulation::{
    SimulationEngine, DEVIATION_ACK, DEVIATION_ACTION, PROTOCOL_ACK, SIMULATION_TOKEN_PREFIX,
};
pub use traits::{ConversationalModel, LlmError, RawReply, ReplyFragment};
