//! Conversation Context - Aggregate Root

use chrono::{DateTime, Utc};

use super::{
    ConversationError, DeltaOutcome, FailureKind, TextSegment, Turn, TurnId, TurnRole, TurnStatus,
};
use crate::domain::text_segmenter::SegmentConfig;

/// Conversation 聚合根
///
/// 不变量:
/// - 回合顺序即提交顺序，不可重排
/// - 任一时刻最多一个回合处于 pending/streaming
/// - 终态回合内容不可变
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 追加用户回合（提交即完成）
    pub fn push_user_turn(&mut self, text: impl Into<String>) -> Result<TurnId, ConversationError> {
        let turn = Turn::user(text)?;
        let id = turn.id();
        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(id)
    }

    /// 打开助手回合
    ///
    /// 进行中回合存在时拒绝，保证无并发流式回合
    pub fn open_assistant_turn(
        &mut self,
        segment_config: SegmentConfig,
    ) -> Result<TurnId, ConversationError> {
        if self.in_flight_turn().is_some() {
            return Err(ConversationError::TurnInFlight);
        }
        let turn = Turn::assistant(segment_config);
        let id = turn.id();
        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(id)
    }

    /// 向指定回合追加增量
    pub fn append_delta(
        &mut self,
        turn_id: TurnId,
        delta: &str,
    ) -> Result<DeltaOutcome, ConversationError> {
        let outcome = self.turn_mut(turn_id)?.append_delta(delta)?;
        self.updated_at = Utc::now();
        Ok(outcome)
    }

    /// 回合流正常结束
    pub fn complete_turn(&mut self, turn_id: TurnId) -> Result<Vec<TextSegment>, ConversationError> {
        let closed = self.turn_mut(turn_id)?.complete()?;
        self.updated_at = Utc::now();
        Ok(closed)
    }

    /// 回合流失败
    pub fn fail_turn(
        &mut self,
        turn_id: TurnId,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<Vec<TextSegment>, ConversationError> {
        let closed = self.turn_mut(turn_id)?.fail(kind, message)?;
        self.updated_at = Utc::now();
        Ok(closed)
    }

    /// 回合被用户取消
    pub fn cancel_turn(&mut self, turn_id: TurnId) -> Result<Vec<TextSegment>, ConversationError> {
        let closed = self.turn_mut(turn_id)?.cancel()?;
        self.updated_at = Utc::now();
        Ok(closed)
    }

    /// 当前进行中（pending/streaming）的回合
    pub fn in_flight_turn(&self) -> Option<&Turn> {
        self.turns.iter().find(|t| t.status().is_in_flight())
    }

    pub fn turn(&self, turn_id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id() == turn_id)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// 已完成回合的 (角色, 文本) 序列，用作补全请求上下文
    ///
    /// 只收录 complete 回合；失败/取消的残句不进入上下文
    pub fn history(&self, max_turns: usize) -> Vec<(TurnRole, String)> {
        let completed: Vec<_> = self
            .turns
            .iter()
            .filter(|t| t.status() == TurnStatus::Complete && !t.content().is_empty())
            .map(|t| (t.role(), t.content().to_string()))
            .collect();

        if max_turns > 0 && completed.len() > max_turns {
            completed[completed.len() - max_turns..].to_vec()
        } else {
            completed
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn turn_mut(&mut self, turn_id: TurnId) -> Result<&mut Turn, ConversationError> {
        self.turns
            .iter_mut()
            .find(|t| t.id() == turn_id)
            .ok_or(ConversationError::TurnNotFound(turn_id))
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
