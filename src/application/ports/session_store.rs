//! Session Store Port - 会话状态唯一写入口
//!
//! 会话的全部字段只经由这里定义的操作变更（单写者约束），
//! 其余组件通过事件订阅读取。具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::conversation::{
    ColorScheme, Conversation, ConversationError, FailureKind, TextSegment, TurnId, TurnRole,
    TurnStatus,
};

/// Session Store 错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Player disabled for session: {0}")]
    PlayerLocked(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conversation rule violated: {0}")]
    Conversation(#[from] ConversationError),
}

/// 进行中回合存在时的提交策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    /// 拒绝提交
    Reject,
    /// 排队，当前回合终结后自动续提
    Queue,
}

impl BusyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusyPolicy::Reject => "reject",
            BusyPolicy::Queue => "queue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reject" => Some(BusyPolicy::Reject),
            "queue" => Some(BusyPolicy::Queue),
            _ => None,
        }
    }
}

impl Default for BusyPolicy {
    fn default() -> Self {
        BusyPolicy::Reject
    }
}

/// 在途请求句柄 - 持有取消令牌
///
/// 每个会话至多一个；取消经由令牌协作式传播
#[derive(Debug, Clone)]
pub struct RequestHandle {
    pub request_id: String,
    pub turn_id: TurnId,
    token: CancellationToken,
}

impl RequestHandle {
    pub fn new(turn_id: TurnId) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            turn_id,
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 会话状态（in-memory）
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub conversation: Conversation,
    pub active_request: Option<RequestHandle>,
    pub player_mode: bool,
    /// 播放设备故障后锁定，本会话内不可再开启叙播
    pub player_locked: bool,
    pub muted: bool,
    pub color_scheme: ColorScheme,
    /// busy_policy=queue 时暂存的用户输入
    pub queued_inputs: VecDeque<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(player_mode: bool, color_scheme: ColorScheme) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            conversation: Conversation::new(),
            active_request: None,
            player_mode,
            player_locked: false,
            muted: false,
            color_scheme,
            queued_inputs: VecDeque::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// 一次已开启交换的全部上下文，供流式工作器驱动
#[derive(Debug, Clone)]
pub struct ExchangeTicket {
    pub session_id: String,
    pub user_turn_id: TurnId,
    pub assistant_turn_id: TurnId,
    pub request_id: String,
    pub token: CancellationToken,
    pub player_mode: bool,
    /// 提交时刻的上下文快照（含本次用户输入）
    pub history: Vec<(TurnRole, String)>,
}

/// 提交用户输入的裁决结果
#[derive(Debug)]
pub enum SubmitDecision {
    /// 新交换已开启
    Started(ExchangeTicket),
    /// 进行中回合存在，输入已排队
    Queued { position: usize },
    /// 进行中回合存在，按策略拒绝
    Busy,
}

/// 一次增量写入的结果
#[derive(Debug, Clone)]
pub struct DeltaApplied {
    /// pending → streaming 迁移是否发生
    pub first_delta: bool,
    /// 本次增量新闭合的句子片段
    pub closed_segments: Vec<TextSegment>,
    /// 写入时刻的叙播开关
    pub player_mode: bool,
}

/// 回合终结的结果
#[derive(Debug, Clone)]
pub struct FinishOutcome {
    pub status: TurnStatus,
    /// 收尾时闭合的片段
    pub closed_segments: Vec<TextSegment>,
    pub player_mode: bool,
}

/// 取消在途回合的结果
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub turn_id: TurnId,
    pub request_id: String,
}

/// 叙播开关切换的结果
#[derive(Debug, Clone)]
pub struct PlayerModeChange {
    pub enabled: bool,
    /// 是否实际发生变化
    pub changed: bool,
    /// 开启时若有进行中回合，附其 ID 与已闭合片段（用于补建提示音）
    pub in_flight: Option<(TurnId, Vec<TextSegment>)>,
}

/// Session Store Port
///
/// 会话状态的单写者。检查与变更在同一持锁区间内完成，
/// 保证"至多一个进行中回合"等不变量不因并发提交破坏
pub trait SessionStorePort: Send + Sync {
    /// 创建新会话，返回初始快照
    fn create(&self, player_mode: bool, color_scheme: ColorScheme) -> Result<Session, SessionError>;

    /// 获取会话快照
    fn get(&self, id: &str) -> Result<Session, SessionError>;

    /// 提交用户输入
    ///
    /// 无进行中回合: 追加用户回合 + 打开助手回合 + 登记在途请求，原子完成。
    /// 有进行中回合: 按 busy 策略排队或拒绝，不追加任何回合
    fn submit_exchange(&self, id: &str, text: &str) -> Result<SubmitDecision, SessionError>;

    /// 取出一条排队输入并开启交换（无排队或仍有在途回合时返回 None）
    fn begin_queued_exchange(&self, id: &str) -> Result<Option<ExchangeTicket>, SessionError>;

    /// 向在途回合追加增量
    fn append_delta(
        &self,
        id: &str,
        turn_id: TurnId,
        delta: &str,
    ) -> Result<DeltaApplied, SessionError>;

    /// 回合流正常结束，清除在途请求
    fn complete_turn(&self, id: &str, turn_id: TurnId) -> Result<FinishOutcome, SessionError>;

    /// 回合流失败，部分内容保留，清除在途请求
    fn fail_turn(
        &self,
        id: &str,
        turn_id: TurnId,
        kind: FailureKind,
        message: &str,
    ) -> Result<FinishOutcome, SessionError>;

    /// 取消在途回合: 取消令牌 + 标记 cancelled + 清除在途请求与排队输入
    ///
    /// 幂等，无在途回合时返回 None
    fn cancel_active_turn(&self, id: &str) -> Result<Option<CancelOutcome>, SessionError>;

    /// 切换叙播开关；设备锁定后开启将被拒绝
    fn set_player_mode(&self, id: &str, enabled: bool) -> Result<PlayerModeChange, SessionError>;

    /// 设备故障: 关闭并锁定叙播，本会话内不可再开启
    fn lock_player(&self, id: &str) -> Result<bool, SessionError>;

    /// 静音开关，返回是否实际变化
    fn set_muted(&self, id: &str, muted: bool) -> Result<bool, SessionError>;

    /// 切换配色
    fn set_color_scheme(&self, id: &str, scheme: ColorScheme) -> Result<(), SessionError>;

    /// 检查会话是否有效
    fn is_valid(&self, id: &str) -> bool;

    /// 关闭会话，在途回合一并取消
    fn close(&self, id: &str) -> Result<Option<CancelOutcome>, SessionError>;

    /// 更新最后活动时间
    fn touch(&self, id: &str);

    /// 获取所有过期会话的 ID
    fn get_expired_sessions(&self, idle_timeout_secs: u64) -> Vec<String>;

    /// 获取所有会话 ID
    fn list_all(&self) -> Vec<String>;
}
