//! Conversation Context - Value Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 回合唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 回合角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// 回合状态
///
/// 状态机: pending → streaming → {complete | failed | cancelled}
/// 三个终态均为吸收态，进入后不再迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// 流已打开，尚未收到首个增量
    Pending,
    /// 正在接收增量
    Streaming,
    /// 流正常结束
    Complete,
    /// 流失败（部分内容保留）
    Failed,
    /// 用户取消（部分内容保留，非错误）
    Cancelled,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Streaming => "streaming",
            TurnStatus::Complete => "complete",
            TurnStatus::Failed => "failed",
            TurnStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TurnStatus::Pending),
            "streaming" => Some(TurnStatus::Streaming),
            "complete" => Some(TurnStatus::Complete),
            "failed" => Some(TurnStatus::Failed),
            "cancelled" => Some(TurnStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnStatus::Complete | TurnStatus::Failed | TurnStatus::Cancelled
        )
    }

    /// 是否在流式阶段（pending 或 streaming）
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TurnStatus::Pending | TurnStatus::Streaming)
    }
}

/// 流失败种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// 超时未收到增量
    Timeout,
    /// 连接被重置
    ConnectionReset,
    /// 服务端错误
    ServerError,
    /// 块不符合流式帧格式
    MalformedStream,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionReset => "connection-reset",
            FailureKind::ServerError => "server-error",
            FailureKind::MalformedStream => "malformed-stream",
        }
    }
}

/// 回合失败详情（status=failed 时存在）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TurnFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// 界面配色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(ColorScheme::Light),
            "dark" => Some(ColorScheme::Dark),
            _ => None,
        }
    }

    /// 明暗互换
    pub fn toggled(&self) -> Self {
        match self {
            ColorScheme::Light => ColorScheme::Dark,
            ColorScheme::Dark => ColorScheme::Light,
        }
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        ColorScheme::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TurnStatus::Pending,
            TurnStatus::Streaming,
            TurnStatus::Complete,
            TurnStatus::Failed,
            TurnStatus::Cancelled,
        ] {
            assert_eq!(TurnStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TurnStatus::from_str("unknown"), None);
    }

    #[test]
    fn test_terminal_states_absorbing_flags() {
        assert!(!TurnStatus::Pending.is_terminal());
        assert!(!TurnStatus::Streaming.is_terminal());
        assert!(TurnStatus::Complete.is_terminal());
        assert!(TurnStatus::Failed.is_terminal());
        assert!(TurnStatus::Cancelled.is_terminal());

        assert!(TurnStatus::Pending.is_in_flight());
        assert!(TurnStatus::Streaming.is_in_flight());
        assert!(!TurnStatus::Complete.is_in_flight());
    }

    #[test]
    fn test_color_scheme_toggle() {
        assert_eq!(ColorScheme::Light.toggled(), ColorScheme::Dark);
        assert_eq!(ColorScheme::Dark.toggled(), ColorScheme::Light);
        assert_eq!(ColorScheme::from_str("dark"), Some(ColorScheme::Dark));
    }
}
