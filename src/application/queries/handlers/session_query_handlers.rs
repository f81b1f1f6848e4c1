//! Session Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{AudioCue, CueState, CueStorePort, Session, SessionStorePort};
use crate::application::queries::{GetNarrationStatusQuery, GetSessionQuery, ListSessionsQuery};
use crate::domain::conversation::{Turn, TurnStatus};

// ============================================================================
// Response DTOs
// ============================================================================

/// 句子片段视图
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub index: usize,
    pub content: String,
}

/// 回合视图
#[derive(Debug, Clone)]
pub struct TurnView {
    pub id: String,
    pub role: String,
    pub status: String,
    pub content: String,
    /// 流式中尚未闭合成片段的尾部文本
    pub pending_tail: String,
    pub segments: Vec<SegmentView>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub created_at: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            id: turn.id().to_string(),
            role: turn.role().as_str().to_string(),
            status: turn.status().as_str().to_string(),
            content: turn.content().to_string(),
            pending_tail: if turn.status() == TurnStatus::Streaming {
                turn.pending_tail()
            } else {
                String::new()
            },
            segments: turn
                .segments()
                .iter()
                .map(|s| SegmentView {
                    index: s.index(),
                    content: s.content().to_string(),
                })
                .collect(),
            failure_kind: turn.failure().map(|f| f.kind.as_str().to_string()),
            failure_message: turn.failure().map(|f| f.message.clone()),
            created_at: turn.created_at().to_rfc3339(),
        }
    }
}

/// 会话详情视图
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub player_mode: bool,
    pub player_locked: bool,
    pub muted: bool,
    pub color_scheme: String,
    /// 是否存在进行中回合
    pub busy: bool,
    pub queued_inputs: usize,
    pub turns: Vec<TurnView>,
    pub created_at: String,
    pub last_activity: String,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            player_mode: session.player_mode,
            player_locked: session.player_locked,
            muted: session.muted,
            color_scheme: session.color_scheme.as_str().to_string(),
            busy: session.active_request.is_some(),
            queued_inputs: session.queued_inputs.len(),
            turns: session.conversation.turns().iter().map(TurnView::from).collect(),
            created_at: session.created_at.to_rfc3339(),
            last_activity: session.last_activity.to_rfc3339(),
        }
    }
}

/// 会话摘要
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub player_mode: bool,
    pub busy: bool,
    pub created_at: String,
    pub last_activity: String,
}

/// 提示音视图
#[derive(Debug, Clone)]
pub struct CueView {
    pub cue_id: String,
    pub turn_id: String,
    pub segment_index: usize,
    pub text: String,
    pub state: String,
    pub error: Option<String>,
    pub created_at: String,
}

impl From<AudioCue> for CueView {
    fn from(cue: AudioCue) -> Self {
        Self {
            cue_id: cue.cue_id,
            turn_id: cue.turn_id.to_string(),
            segment_index: cue.segment_index,
            text: cue.text,
            state: cue.state.as_str().to_string(),
            error: cue.error_message,
            created_at: cue.created_at.to_rfc3339(),
        }
    }
}

/// 叙播进度响应
#[derive(Debug, Clone)]
pub struct NarrationStatusResponse {
    pub session_id: String,
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub done: usize,
    pub errored: usize,
    pub cues: Vec<CueView>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GetSession Handler
pub struct GetSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
}

impl GetSessionHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>) -> Self {
        Self { session_store }
    }

    pub async fn handle(&self, query: GetSessionQuery) -> Result<SessionView, ApplicationError> {
        let session = self.session_store.get(&query.session_id)?;
        Ok(SessionView::from(session))
    }
}

/// ListSessions Handler
pub struct ListSessionsHandler {
    session_store: Arc<dyn SessionStorePort>,
}

impl ListSessionsHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>) -> Self {
        Self { session_store }
    }

    pub async fn handle(
        &self,
        _query: ListSessionsQuery,
    ) -> Result<Vec<SessionSummary>, ApplicationError> {
        let mut summaries = Vec::new();
        for id in self.session_store.list_all() {
            // 遍历期间会话可能被关闭，跳过即可
            if let Ok(session) = self.session_store.get(&id) {
                summaries.push(SessionSummary {
                    session_id: session.id,
                    turn_count: session.conversation.turn_count(),
                    player_mode: session.player_mode,
                    busy: session.active_request.is_some(),
                    created_at: session.created_at.to_rfc3339(),
                    last_activity: session.last_activity.to_rfc3339(),
                });
            }
        }
        Ok(summaries)
    }
}

/// GetNarrationStatus Handler
pub struct GetNarrationStatusHandler {
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
}

impl GetNarrationStatusHandler {
    pub fn new(session_store: Arc<dyn SessionStorePort>, cue_store: Arc<dyn CueStorePort>) -> Self {
        Self {
            session_store,
            cue_store,
        }
    }

    pub async fn handle(
        &self,
        query: GetNarrationStatusQuery,
    ) -> Result<NarrationStatusResponse, ApplicationError> {
        if !self.session_store.is_valid(&query.session_id) {
            return Err(ApplicationError::not_found("Session", &query.session_id));
        }

        let cues = match query.turn_id {
            Some(turn_id) => self.cue_store.cues_for_turn(&query.session_id, turn_id),
            None => self.cue_store.cues_for_session(&query.session_id),
        };

        let mut pending = 0;
        let mut ready = 0;
        let mut done = 0;
        let mut errored = 0;
        for cue in &cues {
            match cue.state {
                CueState::Queued | CueState::Loading => pending += 1,
                CueState::Ready | CueState::Playing => ready += 1,
                CueState::Done => done += 1,
                CueState::Errored => errored += 1,
                CueState::Cancelled => {}
            }
        }

        Ok(NarrationStatusResponse {
            session_id: query.session_id,
            total: cues.len(),
            pending,
            ready,
            done,
            errored,
            cues: cues.into_iter().map(CueView::from).collect(),
        })
    }
}
