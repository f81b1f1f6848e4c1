//! Conversation Context - Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationError, FailureKind, TurnFailure, TurnId, TurnRole, TurnStatus};
use crate::domain::text_segmenter::{SegmentConfig, StreamSegmenter};

/// 文本片段 - 最小叙播单位
///
/// 不变量:
/// - index 在 Turn 内唯一且有序
/// - content 不可为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    /// 片段索引（在回合中的顺序）
    index: usize,
    /// 片段内容
    content: String,
}

impl TextSegment {
    pub fn new(index: usize, content: String) -> Result<Self, &'static str> {
        if content.is_empty() {
            return Err("片段内容不能为空");
        }
        Ok(Self { index, content })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// 一次增量写入的结果
#[derive(Debug, Clone)]
pub struct DeltaOutcome {
    /// 是否为首个增量（pending → streaming 迁移发生）
    pub first_delta: bool,
    /// 本次增量新闭合的句子片段
    pub closed_segments: Vec<TextSegment>,
}

/// 回合 - 会话中的一条消息
///
/// 不变量:
/// - content 只在 pending/streaming 阶段追加，终态后不可变
/// - segments 的 index 严格递增，且只增不删
/// - 终态（complete/failed/cancelled）为吸收态
#[derive(Debug, Clone)]
pub struct Turn {
    id: TurnId,
    role: TurnRole,
    status: TurnStatus,
    /// 原始增量的有序拼接
    content: String,
    /// 已闭合的句子片段
    segments: Vec<TextSegment>,
    segmenter: StreamSegmenter,
    failure: Option<TurnFailure>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Turn {
    /// 创建用户回合（提交即完成）
    pub fn user(text: impl Into<String>) -> Result<Self, ConversationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyInput);
        }
        let now = Utc::now();
        Ok(Self {
            id: TurnId::new(),
            role: TurnRole::User,
            status: TurnStatus::Complete,
            content: text,
            segments: Vec::new(),
            segmenter: StreamSegmenter::default(),
            failure: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 创建助手回合（流打开时，等待首个增量）
    pub fn assistant(segment_config: SegmentConfig) -> Self {
        let now = Utc::now();
        Self {
            id: TurnId::new(),
            role: TurnRole::Assistant,
            status: TurnStatus::Pending,
            content: String::new(),
            segments: Vec::new(),
            segmenter: StreamSegmenter::new(segment_config),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 追加一个文本增量
    ///
    /// 首个增量完成 pending → streaming 迁移；返回其间新闭合的句子片段
    pub fn append_delta(&mut self, delta: &str) -> Result<DeltaOutcome, ConversationError> {
        if self.role != TurnRole::Assistant {
            return Err(ConversationError::NotAssistant(self.id));
        }
        if self.status.is_terminal() {
            return Err(ConversationError::AlreadyTerminal(self.id));
        }

        let first_delta = self.status == TurnStatus::Pending;
        if first_delta {
            self.status = TurnStatus::Streaming;
        }

        self.content.push_str(delta);
        let sentences = self.segmenter.push(delta);
        let closed_segments = self.close_segments(sentences);
        self.updated_at = Utc::now();

        Ok(DeltaOutcome {
            first_delta,
            closed_segments,
        })
    }

    /// 流正常结束，返回收尾时闭合的片段
    pub fn complete(&mut self) -> Result<Vec<TextSegment>, ConversationError> {
        self.seal(TurnStatus::Complete, None)
    }

    /// 流失败，部分内容保留
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<Vec<TextSegment>, ConversationError> {
        self.seal(TurnStatus::Failed, Some(TurnFailure::new(kind, message)))
    }

    /// 用户取消，部分内容保留
    pub fn cancel(&mut self) -> Result<Vec<TextSegment>, ConversationError> {
        self.seal(TurnStatus::Cancelled, None)
    }

    /// 进入终态并冲洗分割器尾部
    fn seal(
        &mut self,
        terminal: TurnStatus,
        failure: Option<TurnFailure>,
    ) -> Result<Vec<TextSegment>, ConversationError> {
        if self.status.is_terminal() {
            return Err(ConversationError::AlreadyTerminal(self.id));
        }
        let tail = self.segmenter.flush();
        let closed = self.close_segments(tail);
        self.status = terminal;
        self.failure = failure;
        self.updated_at = Utc::now();
        Ok(closed)
    }

    /// 将新闭合的句子编号入册
    fn close_segments(&mut self, sentences: Vec<String>) -> Vec<TextSegment> {
        let mut closed = Vec::new();
        for sentence in sentences {
            let index = self.segments.len();
            if let Ok(segment) = TextSegment::new(index, sentence) {
                self.segments.push(segment.clone());
                closed.push(segment);
            }
        }
        closed
    }

    // Getters
    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn status(&self) -> TurnStatus {
        self.status
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn segments(&self) -> &[TextSegment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn get_segment(&self, index: usize) -> Option<&TextSegment> {
        self.segments.get(index)
    }

    /// 尚未闭合的尾部文本
    pub fn pending_tail(&self) -> String {
        self.segmenter.pending()
    }

    pub fn failure(&self) -> Option<&TurnFailure> {
        self.failure.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_created_complete() {
        let turn = Turn::user("你好").unwrap();
        assert_eq!(turn.role(), TurnRole::User);
        assert_eq!(turn.status(), TurnStatus::Complete);
        assert_eq!(turn.content(), "你好");
    }

    #[test]
    fn test_empty_user_input_rejected() {
        assert!(matches!(
            Turn::user("  "),
            Err(ConversationError::EmptyInput)
        ));
    }

    #[test]
    fn test_first_delta_moves_to_streaming() {
        let mut turn = Turn::assistant(SegmentConfig::default());
        assert_eq!(turn.status(), TurnStatus::Pending);

        let outcome = turn.append_delta("Hi").unwrap();
        assert!(outcome.first_delta);
        assert_eq!(turn.status(), TurnStatus::Streaming);

        let outcome = turn.append_delta(" there").unwrap();
        assert!(!outcome.first_delta);
        assert_eq!(turn.content(), "Hi there");
    }

    #[test]
    fn test_content_is_delta_concatenation() {
        let mut turn = Turn::assistant(SegmentConfig { min_chars: 4 });
        for delta in ["第一句。", "第二", "句。"] {
            turn.append_delta(delta).unwrap();
        }
        turn.complete().unwrap();
        assert_eq!(turn.content(), "第一句。第二句。");
        assert_eq!(turn.segment_count(), 2);
    }

    #[test]
    fn test_append_after_terminal_rejected() {
        let mut turn = Turn::assistant(SegmentConfig::default());
        turn.append_delta("部分内容").unwrap();
        turn.cancel().unwrap();

        assert!(matches!(
            turn.append_delta("迟到的增量"),
            Err(ConversationError::AlreadyTerminal(_))
        ));
        // 内容保持取消时的样子
        assert_eq!(turn.content(), "部分内容");
    }

    #[test]
    fn test_terminal_states_absorbing() {
        let mut turn = Turn::assistant(SegmentConfig::default());
        turn.append_delta("内容").unwrap();
        turn.complete().unwrap();

        assert!(turn.cancel().is_err());
        assert!(turn
            .fail(FailureKind::Timeout, "no delta within deadline")
            .is_err());
        assert_eq!(turn.status(), TurnStatus::Complete);
    }

    #[test]
    fn test_failure_preserves_partial_content() {
        let mut turn = Turn::assistant(SegmentConfig { min_chars: 4 });
        turn.append_delta("已收到的内容。之后断开").unwrap();
        turn.fail(FailureKind::ConnectionReset, "connection reset by peer")
            .unwrap();

        assert_eq!(turn.status(), TurnStatus::Failed);
        assert_eq!(turn.content(), "已收到的内容。之后断开");
        assert_eq!(turn.failure().unwrap().kind, FailureKind::ConnectionReset);
    }

    #[test]
    fn test_complete_flushes_tail_segment() {
        let mut turn = Turn::assistant(SegmentConfig { min_chars: 4 });
        turn.append_delta("整句在此。还有尾巴").unwrap();
        assert_eq!(turn.segment_count(), 1);

        let closed = turn.complete().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].content(), "还有尾巴");
        assert_eq!(turn.segment_count(), 2);
    }

    #[test]
    fn test_user_turn_rejects_delta() {
        let mut turn = Turn::user("你好").unwrap();
        assert!(matches!(
            turn.append_delta("x"),
            Err(ConversationError::NotAssistant(_))
        ));
    }
}
