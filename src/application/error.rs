//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{CompletionError, CueError, SessionError};
use crate::domain::conversation::ConversationError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 业务规则违反
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// 已有回合在途（busy_policy=reject 时的提交拒绝）
    #[error("Turn in flight for session: {0}")]
    TurnInFlight(String),

    /// 凭据缺失，控制器未挂载
    #[error("No API credential configured")]
    ControllerUnavailable,

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建业务规则违反错误
    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRuleViolation(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<SessionError> for ApplicationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::not_found("Session", id),
            SessionError::AlreadyExists(id) => {
                Self::invalid_state(format!("Session already exists: {}", id))
            }
            SessionError::PlayerLocked(id) => Self::business_rule(format!(
                "Player disabled after device error for session: {}",
                id
            )),
            SessionError::InvalidOperation(msg) => Self::invalid_state(msg),
            SessionError::Conversation(inner) => inner.into(),
        }
    }
}

impl From<ConversationError> for ApplicationError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::EmptyInput => Self::validation(err.to_string()),
            ConversationError::TurnNotFound(id) => Self::not_found("Turn", id.to_string()),
            other => Self::invalid_state(other.to_string()),
        }
    }
}

impl From<CueError> for ApplicationError {
    fn from(err: CueError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<CompletionError> for ApplicationError {
    fn from(err: CompletionError) -> Self {
        Self::ExternalServiceError(err.to_string())
    }
}
