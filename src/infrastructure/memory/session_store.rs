//! In-Memory Session Store Implementation
//!
//! 会话状态的单写者。所有检查与变更在同一 DashMap 条目锁内完成，
//! 并发提交/取消/增量写入不会交错破坏不变量

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{
    BusyPolicy, CancelOutcome, DeltaApplied, ExchangeTicket, FinishOutcome, PlayerModeChange,
    RequestHandle, Session, SessionError, SessionStorePort, SubmitDecision,
};
use crate::domain::conversation::{ColorScheme, FailureKind, TurnId, TurnStatus};
use crate::domain::SegmentConfig;

/// 会话存储配置
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// 句子切分配置（传给每个助手回合）
    pub segment_config: SegmentConfig,
    /// 在途回合存在时的提交策略
    pub busy_policy: BusyPolicy,
    /// 上下文快照最多携带的历史回合数（0 为不限制）
    pub max_history_turns: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            segment_config: SegmentConfig::default(),
            busy_policy: BusyPolicy::default(),
            max_history_turns: 20,
        }
    }
}

/// 内存会话存储
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    config: SessionStoreConfig,
}

impl InMemorySessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 在持锁的会话上开启一次交换
    fn open_exchange(
        session: &mut Session,
        text: &str,
        config: &SessionStoreConfig,
    ) -> Result<ExchangeTicket, SessionError> {
        let user_turn_id = session.conversation.push_user_turn(text)?;
        let assistant_turn_id = session
            .conversation
            .open_assistant_turn(config.segment_config.clone())?;

        let handle = RequestHandle::new(assistant_turn_id);
        let ticket = ExchangeTicket {
            session_id: session.id.clone(),
            user_turn_id,
            assistant_turn_id,
            request_id: handle.request_id.clone(),
            token: handle.token(),
            player_mode: session.player_mode,
            history: session.conversation.history(config.max_history_turns),
        };

        session.active_request = Some(handle);
        session.last_activity = Utc::now();
        Ok(ticket)
    }
}

impl SessionStorePort for InMemorySessionStore {
    fn create(&self, player_mode: bool, color_scheme: ColorScheme) -> Result<Session, SessionError> {
        let session = Session::new(player_mode, color_scheme);
        let session_id = session.id.clone();
        let snapshot = session.clone();
        self.sessions.insert(session_id.clone(), session);
        tracing::info!(session_id = %session_id, "Session created");
        Ok(snapshot)
    }

    fn get(&self, id: &str) -> Result<Session, SessionError> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    fn submit_exchange(&self, id: &str, text: &str) -> Result<SubmitDecision, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.last_activity = Utc::now();

        if session.active_request.is_some() {
            return match self.config.busy_policy {
                BusyPolicy::Reject => Ok(SubmitDecision::Busy),
                BusyPolicy::Queue => {
                    if text.trim().is_empty() {
                        return Err(crate::domain::conversation::ConversationError::EmptyInput.into());
                    }
                    session.queued_inputs.push_back(text.to_string());
                    Ok(SubmitDecision::Queued {
                        position: session.queued_inputs.len(),
                    })
                }
            };
        }

        let ticket = Self::open_exchange(&mut session, text, &self.config)?;
        Ok(SubmitDecision::Started(ticket))
    }

    fn begin_queued_exchange(&self, id: &str) -> Result<Option<ExchangeTicket>, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.active_request.is_some() {
            return Ok(None);
        }
        let Some(text) = session.queued_inputs.pop_front() else {
            return Ok(None);
        };

        let ticket = Self::open_exchange(&mut session, &text, &self.config)?;
        tracing::info!(
            session_id = %id,
            remaining = session.queued_inputs.len(),
            "Queued exchange started"
        );
        Ok(Some(ticket))
    }

    fn append_delta(
        &self,
        id: &str,
        turn_id: TurnId,
        delta: &str,
    ) -> Result<DeltaApplied, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        // 在途请求已不指向该回合时即为迟到写入，一律拒绝
        let active = session
            .active_request
            .as_ref()
            .map(|h| h.turn_id == turn_id)
            .unwrap_or(false);
        if !active {
            return Err(SessionError::InvalidOperation(format!(
                "turn {} is not active",
                turn_id
            )));
        }

        let outcome = session.conversation.append_delta(turn_id, delta)?;
        session.last_activity = Utc::now();
        Ok(DeltaApplied {
            first_delta: outcome.first_delta,
            closed_segments: outcome.closed_segments,
            player_mode: session.player_mode,
        })
    }

    fn complete_turn(&self, id: &str, turn_id: TurnId) -> Result<FinishOutcome, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let active = session
            .active_request
            .as_ref()
            .map(|h| h.turn_id == turn_id)
            .unwrap_or(false);
        if !active {
            return Err(SessionError::InvalidOperation(format!(
                "turn {} is not active",
                turn_id
            )));
        }

        let closed_segments = session.conversation.complete_turn(turn_id)?;
        session.active_request = None;
        session.last_activity = Utc::now();
        Ok(FinishOutcome {
            status: TurnStatus::Complete,
            closed_segments,
            player_mode: session.player_mode,
        })
    }

    fn fail_turn(
        &self,
        id: &str,
        turn_id: TurnId,
        kind: FailureKind,
        message: &str,
    ) -> Result<FinishOutcome, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let active = session
            .active_request
            .as_ref()
            .map(|h| h.turn_id == turn_id)
            .unwrap_or(false);
        if !active {
            return Err(SessionError::InvalidOperation(format!(
                "turn {} is not active",
                turn_id
            )));
        }

        let closed_segments = session.conversation.fail_turn(turn_id, kind, message)?;
        session.active_request = None;
        session.last_activity = Utc::now();
        Ok(FinishOutcome {
            status: TurnStatus::Failed,
            closed_segments,
            player_mode: session.player_mode,
        })
    }

    fn cancel_active_turn(&self, id: &str) -> Result<Option<CancelOutcome>, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let Some(handle) = session.active_request.take() else {
            return Ok(None);
        };
        handle.cancel();
        // 取消即全停，排队的输入一并清空
        session.queued_inputs.clear();

        // 取消时收尾冲出的片段直接弃置，不进叙播
        let _ = session.conversation.cancel_turn(handle.turn_id)?;
        session.last_activity = Utc::now();

        Ok(Some(CancelOutcome {
            turn_id: handle.turn_id,
            request_id: handle.request_id,
        }))
    }

    fn set_player_mode(&self, id: &str, enabled: bool) -> Result<PlayerModeChange, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if enabled && session.player_locked {
            return Err(SessionError::PlayerLocked(id.to_string()));
        }

        let changed = session.player_mode != enabled;
        session.player_mode = enabled;
        session.last_activity = Utc::now();

        // 开启时附上进行中回合的已闭合片段，供补建提示音
        let in_flight = if enabled && changed {
            session
                .conversation
                .in_flight_turn()
                .map(|t| (t.id(), t.segments().to_vec()))
        } else {
            None
        };

        Ok(PlayerModeChange {
            enabled,
            changed,
            in_flight,
        })
    }

    fn lock_player(&self, id: &str) -> Result<bool, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let was_enabled = session.player_mode;
        session.player_mode = false;
        session.player_locked = true;
        tracing::warn!(session_id = %id, "Player locked after device failure");
        Ok(was_enabled)
    }

    fn set_muted(&self, id: &str, muted: bool) -> Result<bool, SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let changed = session.muted != muted;
        session.muted = muted;
        session.last_activity = Utc::now();
        Ok(changed)
    }

    fn set_color_scheme(&self, id: &str, scheme: ColorScheme) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        session.color_scheme = scheme;
        session.last_activity = Utc::now();
        Ok(())
    }

    fn is_valid(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    fn close(&self, id: &str) -> Result<Option<CancelOutcome>, SessionError> {
        let (_, mut session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let cancelled = session.active_request.take().map(|handle| {
            handle.cancel();
            let _ = session.conversation.cancel_turn(handle.turn_id);
            CancelOutcome {
                turn_id: handle.turn_id,
                request_id: handle.request_id,
            }
        });

        tracing::info!(session_id = %id, "Session closed");
        Ok(cancelled)
    }

    fn touch(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_activity = Utc::now();
        }
    }

    fn get_expired_sessions(&self, idle_timeout_secs: u64) -> Vec<String> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(idle_timeout_secs as i64);

        self.sessions
            .iter()
            .filter_map(|entry| {
                let elapsed = now - entry.last_activity;
                if elapsed > timeout {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn list_all(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::TurnRole;

    fn store_with(policy: BusyPolicy) -> InMemorySessionStore {
        InMemorySessionStore::new(SessionStoreConfig {
            segment_config: SegmentConfig { min_chars: 4 },
            busy_policy: policy,
            max_history_turns: 20,
        })
    }

    #[test]
    fn test_session_lifecycle() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();
        let session_id = session.id.clone();

        assert!(store.is_valid(&session_id));

        let decision = store.submit_exchange(&session_id, "你好").unwrap();
        let ticket = match decision {
            SubmitDecision::Started(t) => t,
            other => panic!("expected Started, got {:?}", other),
        };

        // 上下文快照以本次用户输入收尾
        let last = ticket.history.last().unwrap();
        assert_eq!(last.0, TurnRole::User);
        assert_eq!(last.1, "你好");

        store
            .append_delta(&session_id, ticket.assistant_turn_id, "回答。")
            .unwrap();
        let finish = store
            .complete_turn(&session_id, ticket.assistant_turn_id)
            .unwrap();
        assert_eq!(finish.status, TurnStatus::Complete);

        let cancelled = store.close(&session_id).unwrap();
        assert!(cancelled.is_none());
        assert!(!store.is_valid(&session_id));
    }

    #[test]
    fn test_submit_rejected_while_busy() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();

        let first = store.submit_exchange(&session.id, "第一条").unwrap();
        let ticket = match first {
            SubmitDecision::Started(t) => t,
            other => panic!("expected Started, got {:?}", other),
        };

        let second = store.submit_exchange(&session.id, "第二条").unwrap();
        assert!(matches!(second, SubmitDecision::Busy));

        store
            .complete_turn(&session.id, ticket.assistant_turn_id)
            .unwrap();
        let third = store.submit_exchange(&session.id, "第三条").unwrap();
        assert!(matches!(third, SubmitDecision::Started(_)));
    }

    #[test]
    fn test_submit_queued_while_busy() {
        let store = store_with(BusyPolicy::Queue);
        let session = store.create(false, ColorScheme::Light).unwrap();

        let first = store.submit_exchange(&session.id, "第一条").unwrap();
        let ticket = match first {
            SubmitDecision::Started(t) => t,
            other => panic!("expected Started, got {:?}", other),
        };

        let second = store.submit_exchange(&session.id, "第二条").unwrap();
        assert!(matches!(second, SubmitDecision::Queued { position: 1 }));

        // 在途回合未终结时不可续提
        assert!(store.begin_queued_exchange(&session.id).unwrap().is_none());

        store
            .complete_turn(&session.id, ticket.assistant_turn_id)
            .unwrap();
        let queued = store.begin_queued_exchange(&session.id).unwrap();
        let queued = queued.expect("queued exchange should start");
        assert_eq!(queued.history.last().unwrap().1, "第二条");

        // 队列已空
        store
            .complete_turn(&session.id, queued.assistant_turn_id)
            .unwrap();
        assert!(store.begin_queued_exchange(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_late_delta_rejected_after_cancel() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();

        let ticket = match store.submit_exchange(&session.id, "问题").unwrap() {
            SubmitDecision::Started(t) => t,
            other => panic!("expected Started, got {:?}", other),
        };
        store
            .append_delta(&session.id, ticket.assistant_turn_id, "部分回答")
            .unwrap();

        let cancelled = store.cancel_active_turn(&session.id).unwrap();
        assert!(cancelled.is_some());
        assert!(ticket.token.is_cancelled());

        // 取消后的迟到增量不落地
        let late = store.append_delta(&session.id, ticket.assistant_turn_id, "迟到内容");
        assert!(late.is_err());

        let snapshot = store.get(&session.id).unwrap();
        let turn = snapshot.conversation.turn(ticket.assistant_turn_id).unwrap();
        assert_eq!(turn.status(), TurnStatus::Cancelled);
        assert_eq!(turn.content(), "部分回答");
    }

    #[test]
    fn test_cancel_without_active_turn_is_noop() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();
        assert!(store.cancel_active_turn(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_player_lock_blocks_enable() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(true, ColorScheme::Light).unwrap();

        let was_enabled = store.lock_player(&session.id).unwrap();
        assert!(was_enabled);

        let result = store.set_player_mode(&session.id, true);
        assert!(matches!(result, Err(SessionError::PlayerLocked(_))));

        // 关闭方向不受锁影响
        let change = store.set_player_mode(&session.id, false).unwrap();
        assert!(!change.changed);
    }

    #[test]
    fn test_enable_player_mode_snapshots_in_flight_segments() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();

        let ticket = match store.submit_exchange(&session.id, "问题").unwrap() {
            SubmitDecision::Started(t) => t,
            other => panic!("expected Started, got {:?}", other),
        };
        store
            .append_delta(&session.id, ticket.assistant_turn_id, "第一句话完整。还没闭合")
            .unwrap();

        let change = store.set_player_mode(&session.id, true).unwrap();
        assert!(change.changed);
        let (turn_id, segments) = change.in_flight.expect("in-flight turn snapshot");
        assert_eq!(turn_id, ticket.assistant_turn_id);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content(), "第一句话完整。");
    }

    #[test]
    fn test_empty_input_rejected() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();
        assert!(store.submit_exchange(&session.id, "   ").is_err());
    }

    #[test]
    fn test_expired_sessions() {
        let store = store_with(BusyPolicy::Reject);
        let session = store.create(false, ColorScheme::Light).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let expired = store.get_expired_sessions(0);
        assert!(expired.contains(&session.id));

        let expired = store.get_expired_sessions(3600);
        assert!(expired.is_empty());
    }
}
