//! Conversation Context - 会话限界上下文
//!
//! 职责:
//! - 会话聚合与回合状态机
//! - 流式内容的追加与句子闭合
//! - 终态不可变与单进行中回合约束

mod aggregate;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::Conversation;
pub use entities::{DeltaOutcome, TextSegment, Turn};
pub use errors::ConversationError;
pub use value_objects::{ColorScheme, FailureKind, TurnFailure, TurnId, TurnRole, TurnStatus};
