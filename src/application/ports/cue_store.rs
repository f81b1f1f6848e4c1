//! Cue Store Port - 叙播提示音管理
//!
//! 提示音按 (回合, 片段索引) 入册，形成合成乱序完成、播放严格
//! 按索引推进所需的重排缓冲。具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::speech::SynthesizedAudio;
use crate::domain::conversation::{TextSegment, TurnId};

/// Cue Store 错误
#[derive(Debug, Error)]
pub enum CueError {
    #[error("Cue not found: {0}")]
    NotFound(String),

    #[error("Cue already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Synthesis queue full: {0}")]
    QueueFull(String),
}

/// 提示音状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueState {
    /// 等待合成
    Queued,
    /// 正在合成
    Loading,
    /// 合成完成，等待轮到播放
    Ready,
    /// 正在播放
    Playing,
    /// 播放完成
    Done,
    /// 合成或解码失败（播放时跳过）
    Errored,
    /// 已废弃（回合取消 / 叙播关闭）
    Cancelled,
}

impl CueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CueState::Queued => "queued",
            CueState::Loading => "loading",
            CueState::Ready => "ready",
            CueState::Playing => "playing",
            CueState::Done => "done",
            CueState::Errored => "errored",
            CueState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(CueState::Queued),
            "loading" => Some(CueState::Loading),
            "ready" => Some(CueState::Ready),
            "playing" => Some(CueState::Playing),
            "done" => Some(CueState::Done),
            "errored" => Some(CueState::Errored),
            "cancelled" => Some(CueState::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, CueState::Done | CueState::Errored | CueState::Cancelled)
    }
}

/// 叙播提示音 - 一个待合成/播放的句子片段
#[derive(Debug, Clone)]
pub struct AudioCue {
    pub cue_id: String,
    pub session_id: String,
    pub turn_id: TurnId,
    pub segment_index: usize,
    pub text: String,
    pub state: CueState,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl AudioCue {
    pub fn new(session_id: impl Into<String>, turn_id: TurnId, segment: &TextSegment) -> Self {
        Self {
            cue_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            turn_id,
            segment_index: segment.index(),
            text: segment.content().to_string(),
            state: CueState::Queued,
            error_message: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }
}

/// Cue Store Port
///
/// 管理提示音的生命周期；音频字节单独存放，播放时一次性取走
pub trait CueStorePort: Send + Sync {
    /// 入册并推入合成队列，返回 cue ID 列表
    fn submit(&self, cues: Vec<AudioCue>) -> Result<Vec<String>, CueError>;

    /// 获取提示音
    fn get(&self, cue_id: &str) -> Option<AudioCue>;

    /// 按 (会话, 回合, 片段索引) 查找
    fn get_by_position(
        &self,
        session_id: &str,
        turn_id: TurnId,
        segment_index: usize,
    ) -> Option<AudioCue>;

    /// 回合的所有提示音（按片段索引升序）
    fn cues_for_turn(&self, session_id: &str, turn_id: TurnId) -> Vec<AudioCue>;

    /// 会话的所有提示音（回合入册顺序 + 片段索引升序）
    fn cues_for_session(&self, session_id: &str) -> Vec<AudioCue>;

    /// 状态迁移（queued→loading→ready→playing→done，非法迁移报错）
    fn set_state(&self, cue_id: &str, state: CueState) -> Result<(), CueError>;

    /// 合成完成: loading → ready 并存入音频
    ///
    /// 提示音已被废弃时报 InvalidStateTransition，合成结果弃置
    fn set_ready(&self, cue_id: &str, audio: SynthesizedAudio) -> Result<(), CueError>;

    /// 合成或解码失败: loading/playing → errored
    fn set_errored(&self, cue_id: &str, error: String) -> Result<(), CueError>;

    /// 取走 ready 提示音的音频字节（播放即消费）
    fn take_audio(&self, cue_id: &str) -> Option<SynthesizedAudio>;

    /// 检查提示音是否已废弃（缺失视为已废弃）
    fn is_cancelled(&self, cue_id: &str) -> bool;

    /// 废弃回合的所有未完结提示音，返回废弃数量
    fn discard_turn(&self, session_id: &str, turn_id: TurnId) -> usize;

    /// 废弃会话的所有未完结提示音，返回废弃数量
    fn discard_session(&self, session_id: &str) -> usize;

    /// 清理会话的所有提示音记录
    fn cleanup_session(&self, session_id: &str);
}
