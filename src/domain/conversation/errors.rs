//! Conversation Context - Errors

use thiserror::Error;

use super::TurnId;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("回合不存在: {0}")]
    TurnNotFound(TurnId),

    #[error("已有回合处于进行中")]
    TurnInFlight,

    #[error("回合已处于终态: {0}")]
    AlreadyTerminal(TurnId),

    #[error("用户回合不接受流式写入: {0}")]
    NotAssistant(TurnId),

    #[error("用户输入不能为空")]
    EmptyInput,
}
