//! Completion Client Port - 补全后端抽象
//!
//! 定义流式补全请求的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::credentials::ApiCredential;
use crate::domain::conversation::{FailureKind, TurnRole};

/// Completion 错误
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error ({status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed stream: {0}")]
    MalformedStream(String),
}

impl CompletionError {
    /// 映射到回合失败种类（用户可见的失败分类）
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CompletionError::Timeout => FailureKind::Timeout,
            CompletionError::NetworkError(_) | CompletionError::ConnectionReset(_) => {
                FailureKind::ConnectionReset
            }
            CompletionError::ServiceError { .. } | CompletionError::Unauthorized(_) => {
                FailureKind::ServerError
            }
            CompletionError::MalformedStream(_) => FailureKind::MalformedStream,
        }
    }
}

/// 对话消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<TurnRole> for ChatRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
        }
    }
}

/// 对话消息（补全请求上下文的一条）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// 流式补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// 模型名
    pub model: String,
    /// 上下文消息（含本次用户输入）
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// 一次流式补全的增量序列
///
/// 惰性、有限、不可重启；next_delta 返回 None 表示流正常结束
#[async_trait]
pub trait CompletionStream: Send {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>>;
}

/// Completion Client Port
///
/// 外部补全服务的抽象接口
#[async_trait]
pub trait CompletionClientPort: Send + Sync {
    /// 打开一次流式补全
    async fn open(
        &self,
        request: CompletionRequest,
        credential: &ApiCredential,
    ) -> Result<Box<dyn CompletionStream>, CompletionError>;

    /// 检查补全服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
