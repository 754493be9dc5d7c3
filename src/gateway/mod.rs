//! 网关：WebSocket 接入与消息格式

pub mod hub;
pub mod message;

pub use hub::{AuditHub, HubConfig};
pub use message::{InboundMessage, OutboundMessage};
