//! Aegis - 实时安全审计服务
//!
//! 模块划分：
//! - **agent**: 启动时构建共享组件，为每个连接创建 Orchestrator
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、阶段状态机、结果呈现、会话编排器
//! - **gateway**: WebSocket 接入与消息格式
//! - **knowledge**: 协议知识库（基线片段 / 文档目录）
//! - **llm**: 对话模型抽象、Gemini 客户端、模拟引擎、Mock
//! - **memory**: 会话对话历史
//! - **observability**: 日志初始化
//! - **storage**: 偏差记录（SQLite / 内存）
//! - **tools**: 工具声明表、注册表、执行器与两个审计工具

pub mod agent;
pub mod config;
pub mod core;
pub mod gateway;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod storage;
pub mod tools;

pub use agent::AuditComponents;
pub use core::{Orchestrator, TurnOutcome};
