//! 记忆层：每个会话的短期对话历史

pub mod conversation;

pub use conversation::{ConversationHistory, Role, Turn};
