//! Stream Worker - Completion Stream Driver
//!
//! 驱动一次流式补全直至终结：逐增量落库、闭合句子入叙播队列。
//! 取消经由令牌协作式生效，取消后的迟到增量被存储拒绝；
//! 增量间隔超时按 timeout 失败，已落地的部分内容保留

use std::sync::Arc;
use tokio::time::Duration;

use crate::application::ports::{
    AudioCue, ChatMessage, ChatRole, CompletionClientPort, CompletionError, CompletionRequest,
    CredentialStorePort, CueStorePort, ExchangeTicket, FinishOutcome, SessionStorePort,
};
use crate::domain::conversation::{TextSegment, TurnId, TurnRole, TurnStatus};
use crate::infrastructure::events::EventPublisher;

/// Stream Worker 配置
#[derive(Debug, Clone)]
pub struct StreamWorkerConfig {
    /// 补全模型名
    pub model: String,
    /// 相邻增量的最大间隔（秒），超过按超时失败
    pub chunk_timeout_secs: u64,
    /// 系统提示词，空则不注入
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for StreamWorkerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            chunk_timeout_secs: 30,
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// 流式工作器
///
/// 每次交换在独立任务中驱动；回合终结后从排队输入续提
pub struct StreamWorker {
    config: StreamWorkerConfig,
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    credential_store: Arc<dyn CredentialStorePort>,
    completion_client: Arc<dyn CompletionClientPort>,
    event_publisher: Arc<EventPublisher>,
}

impl StreamWorker {
    pub fn new(
        config: StreamWorkerConfig,
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        credential_store: Arc<dyn CredentialStorePort>,
        completion_client: Arc<dyn CompletionClientPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            session_store,
            cue_store,
            credential_store,
            completion_client,
            event_publisher,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 广播回合创建并在后台驱动流
    pub fn launch(self: &Arc<Self>, ticket: ExchangeTicket) {
        self.announce(&ticket);
        let worker = self.clone();
        tokio::spawn(async move {
            worker.drive(ticket).await;
        });
    }

    fn announce(&self, ticket: &ExchangeTicket) {
        self.event_publisher.publish_turn_created(
            &ticket.session_id,
            ticket.user_turn_id,
            TurnRole::User.as_str(),
        );
        self.event_publisher.publish_turn_created(
            &ticket.session_id,
            ticket.assistant_turn_id,
            TurnRole::Assistant.as_str(),
        );
    }

    /// 驱动一次交换，随后续提排队的输入直到队列空
    async fn drive(self: Arc<Self>, ticket: ExchangeTicket) {
        let session_id = ticket.session_id.clone();
        self.drive_exchange(ticket).await;

        // 队列续提的唯一入口：上一回合在此处已终结
        loop {
            match self.session_store.begin_queued_exchange(&session_id) {
                Ok(Some(next)) => {
                    self.announce(&next);
                    self.drive_exchange(next).await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Queue drain stopped");
                    break;
                }
            }
        }
    }

    async fn drive_exchange(&self, ticket: ExchangeTicket) {
        let chunk_timeout = Duration::from_secs(self.config.chunk_timeout_secs);

        // 提交与开流之间凭据可能已被清除
        let Some(credential) = self.credential_store.get() else {
            self.finish_failed(
                &ticket,
                CompletionError::Unauthorized("credential cleared before stream opened".to_string()),
            );
            return;
        };

        let request = self.build_request(&ticket);
        let opened = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => {
                tracing::debug!(
                    session_id = %ticket.session_id,
                    request_id = %ticket.request_id,
                    "Cancelled before stream opened"
                );
                return;
            }
            result = tokio::time::timeout(
                chunk_timeout,
                self.completion_client.open(request, &credential),
            ) => result.unwrap_or(Err(CompletionError::Timeout)),
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.finish_failed(&ticket, e);
                return;
            }
        };

        tracing::info!(
            session_id = %ticket.session_id,
            request_id = %ticket.request_id,
            turn_id = %ticket.assistant_turn_id,
            "Stream opened"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = ticket.token.cancelled() => {
                    // 状态迁移由取消方完成，这里只停止泵送
                    tracing::debug!(
                        session_id = %ticket.session_id,
                        request_id = %ticket.request_id,
                        "Stream cancelled"
                    );
                    return;
                }
                result = tokio::time::timeout(chunk_timeout, stream.next_delta()) => result,
            };

            let item = match next {
                Ok(item) => item,
                Err(_elapsed) => {
                    self.finish_failed(&ticket, CompletionError::Timeout);
                    return;
                }
            };

            match item {
                Some(Ok(delta)) => {
                    if !self.apply_delta(&ticket, &delta) {
                        return;
                    }
                }
                Some(Err(e)) => {
                    self.finish_failed(&ticket, e);
                    return;
                }
                None => {
                    self.finish_complete(&ticket);
                    return;
                }
            }
        }
    }

    /// 落地一条增量；返回 false 表示流应停止
    fn apply_delta(&self, ticket: &ExchangeTicket, delta: &str) -> bool {
        match self
            .session_store
            .append_delta(&ticket.session_id, ticket.assistant_turn_id, delta)
        {
            Ok(applied) => {
                if applied.first_delta {
                    self.event_publisher.publish_turn_status(
                        &ticket.session_id,
                        ticket.assistant_turn_id,
                        TurnStatus::Streaming,
                        None,
                    );
                }
                self.event_publisher.publish_turn_delta(
                    &ticket.session_id,
                    ticket.assistant_turn_id,
                    delta,
                );
                if applied.player_mode && !applied.closed_segments.is_empty() {
                    self.enqueue_cues(ticket, &applied.closed_segments);
                }
                true
            }
            Err(e) => {
                // 取消或会话关闭后的迟到增量
                tracing::debug!(
                    session_id = %ticket.session_id,
                    request_id = %ticket.request_id,
                    error = %e,
                    "Late delta rejected"
                );
                false
            }
        }
    }

    fn finish_complete(&self, ticket: &ExchangeTicket) {
        match self
            .session_store
            .complete_turn(&ticket.session_id, ticket.assistant_turn_id)
        {
            Ok(outcome) => {
                self.event_publisher.publish_turn_status(
                    &ticket.session_id,
                    ticket.assistant_turn_id,
                    TurnStatus::Complete,
                    None,
                );
                self.enqueue_finish_cues(ticket, &outcome);
                tracing::info!(
                    session_id = %ticket.session_id,
                    request_id = %ticket.request_id,
                    turn_id = %ticket.assistant_turn_id,
                    "Stream completed"
                );
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %ticket.session_id,
                    error = %e,
                    "Turn already settled, completion dropped"
                );
            }
        }
    }

    fn finish_failed(&self, ticket: &ExchangeTicket, error: CompletionError) {
        let kind = error.failure_kind();
        let message = error.to_string();
        match self.session_store.fail_turn(
            &ticket.session_id,
            ticket.assistant_turn_id,
            kind,
            &message,
        ) {
            Ok(outcome) => {
                let session = self.session_store.get(&ticket.session_id).ok();
                let failure = session
                    .as_ref()
                    .and_then(|s| s.conversation.turn(ticket.assistant_turn_id))
                    .and_then(|t| t.failure().cloned());
                self.event_publisher.publish_turn_status(
                    &ticket.session_id,
                    ticket.assistant_turn_id,
                    TurnStatus::Failed,
                    failure.as_ref(),
                );
                // 失败回合的既有片段仍可叙播
                self.enqueue_finish_cues(ticket, &outcome);
                tracing::warn!(
                    session_id = %ticket.session_id,
                    request_id = %ticket.request_id,
                    turn_id = %ticket.assistant_turn_id,
                    kind = kind.as_str(),
                    error = %message,
                    "Stream failed"
                );
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %ticket.session_id,
                    error = %e,
                    "Turn already settled, failure dropped"
                );
            }
        }
    }

    fn enqueue_finish_cues(&self, ticket: &ExchangeTicket, outcome: &FinishOutcome) {
        if outcome.player_mode && !outcome.closed_segments.is_empty() {
            self.enqueue_cues(ticket, &outcome.closed_segments);
        }
    }

    fn enqueue_cues(&self, ticket: &ExchangeTicket, segments: &[TextSegment]) {
        self.enqueue_segments(&ticket.session_id, ticket.assistant_turn_id, segments);
    }

    fn enqueue_segments(&self, session_id: &str, turn_id: TurnId, segments: &[TextSegment]) {
        let cues: Vec<AudioCue> = segments
            .iter()
            .map(|seg| AudioCue::new(session_id, turn_id, seg))
            .collect();

        match self.cue_store.submit(cues.clone()) {
            Ok(_) => {
                for cue in &cues {
                    self.event_publisher.publish_cue_state(cue);
                }
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    turn_id = %turn_id,
                    error = %e,
                    "Failed to enqueue cues"
                );
            }
        }
    }

    fn build_request(&self, ticket: &ExchangeTicket) -> CompletionRequest {
        let mut messages = Vec::with_capacity(ticket.history.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(ChatMessage::new(ChatRole::System, prompt.clone()));
        }
        for (role, content) in &ticket.history {
            messages.push(ChatMessage::new(ChatRole::from(*role), content.clone()));
        }

        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ApiCredential, BusyPolicy, SubmitDecision};
    use crate::domain::conversation::{ColorScheme, FailureKind};
    use crate::domain::SegmentConfig;
    use crate::infrastructure::adapters::{FakeCompletionClient, FakeFailure, FakeStep};
    use crate::infrastructure::memory::{
        InMemoryCredentialStore, InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
    };
    use tokio::sync::mpsc;

    struct Rig {
        session_store: Arc<InMemorySessionStore>,
        cue_store: Arc<InMemoryCueStore>,
        worker: Arc<StreamWorker>,
        _cue_rx: mpsc::Receiver<String>,
    }

    fn build_rig(policy: BusyPolicy, steps: Vec<FakeStep>, chunk_timeout_secs: u64) -> Rig {
        let session_store = InMemorySessionStore::new(SessionStoreConfig {
            segment_config: SegmentConfig { min_chars: 4 },
            busy_policy: policy,
            max_history_turns: 20,
        })
        .arc();
        let (cue_tx, cue_rx) = mpsc::channel(100);
        let cue_store = InMemoryCueStore::new(cue_tx).arc();
        let credential_store = InMemoryCredentialStore::new().arc();
        credential_store.set(ApiCredential::new("sk-test-credential".to_string()).unwrap());
        let completion_client = Arc::new(FakeCompletionClient::new(steps).with_delta_gap(2));
        let event_publisher = EventPublisher::new().arc();

        let worker = StreamWorker::new(
            StreamWorkerConfig {
                chunk_timeout_secs,
                ..Default::default()
            },
            session_store.clone(),
            cue_store.clone(),
            credential_store,
            completion_client,
            event_publisher,
        )
        .arc();

        Rig {
            session_store,
            cue_store,
            worker,
            _cue_rx: cue_rx,
        }
    }

    fn start_exchange(rig: &Rig, player_mode: bool, text: &str) -> ExchangeTicket {
        let session = rig
            .session_store
            .create(player_mode, ColorScheme::Light)
            .unwrap();
        match rig.session_store.submit_exchange(&session.id, text).unwrap() {
            SubmitDecision::Started(ticket) => ticket,
            other => panic!("expected Started, got {:?}", other),
        }
    }

    async fn wait_for_status(rig: &Rig, ticket: &ExchangeTicket, expected: TurnStatus) {
        for _ in 0..300 {
            let session = rig.session_store.get(&ticket.session_id).unwrap();
            if let Some(turn) = session.conversation.turn(ticket.assistant_turn_id) {
                if turn.status() == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("turn never reached {:?}", expected);
    }

    #[tokio::test]
    async fn test_stream_happy_path() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![
                FakeStep::Delta("第一句话说完。".to_string()),
                FakeStep::Delta("第二句".to_string()),
                FakeStep::Delta("也说完了。".to_string()),
            ],
            5,
        );
        let ticket = start_exchange(&rig, false, "请回答");

        rig.worker.launch(ticket.clone());
        wait_for_status(&rig, &ticket, TurnStatus::Complete).await;

        let session = rig.session_store.get(&ticket.session_id).unwrap();
        let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
        // 展示内容是增量的原样拼接
        assert_eq!(turn.content(), "第一句话说完。第二句也说完了。");
        assert_eq!(turn.segment_count(), 2);
        assert!(session.active_request.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_stream_without_late_writes() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![
                FakeStep::Delta("第一段内容。".to_string()),
                FakeStep::Stall,
            ],
            30,
        );
        let ticket = start_exchange(&rig, false, "请回答");
        rig.worker.launch(ticket.clone());

        // 等第一段落地
        for _ in 0..300 {
            let session = rig.session_store.get(&ticket.session_id).unwrap();
            let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
            if !turn.content().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let cancelled = rig
            .session_store
            .cancel_active_turn(&ticket.session_id)
            .unwrap();
        assert!(cancelled.is_some());

        wait_for_status(&rig, &ticket, TurnStatus::Cancelled).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 取消后内容不再变化
        let session = rig.session_store.get(&ticket.session_id).unwrap();
        let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
        assert_eq!(turn.content(), "第一段内容。");
        assert!(session.active_request.is_none());
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![
                FakeStep::Delta("部分内容。".to_string()),
                FakeStep::Stall,
            ],
            1,
        );
        let ticket = start_exchange(&rig, false, "请回答");
        rig.worker.launch(ticket.clone());

        wait_for_status(&rig, &ticket, TurnStatus::Failed).await;

        let session = rig.session_store.get(&ticket.session_id).unwrap();
        let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
        let failure = turn.failure().expect("failure recorded");
        assert_eq!(failure.kind, FailureKind::Timeout);
        // 已落地的部分内容保留
        assert_eq!(turn.content(), "部分内容。");
    }

    #[tokio::test]
    async fn test_midstream_error_keeps_partial_content() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![
                FakeStep::Delta("部分回答。".to_string()),
                FakeStep::Fail(FakeFailure::ConnectionReset),
            ],
            5,
        );
        let ticket = start_exchange(&rig, false, "请回答");
        rig.worker.launch(ticket.clone());

        wait_for_status(&rig, &ticket, TurnStatus::Failed).await;

        let session = rig.session_store.get(&ticket.session_id).unwrap();
        let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
        assert_eq!(turn.failure().unwrap().kind, FailureKind::ConnectionReset);
        assert_eq!(turn.content(), "部分回答。");
        assert_eq!(turn.segment_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_stream_fails_turn() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![FakeStep::Fail(FakeFailure::MalformedStream)],
            5,
        );
        let ticket = start_exchange(&rig, false, "请回答");
        rig.worker.launch(ticket.clone());

        wait_for_status(&rig, &ticket, TurnStatus::Failed).await;

        let session = rig.session_store.get(&ticket.session_id).unwrap();
        let turn = session.conversation.turn(ticket.assistant_turn_id).unwrap();
        assert_eq!(turn.failure().unwrap().kind, FailureKind::MalformedStream);
    }

    #[tokio::test]
    async fn test_queued_input_drains_after_completion() {
        let rig = build_rig(
            BusyPolicy::Queue,
            vec![FakeStep::Delta("好的，明白了。".to_string())],
            5,
        );
        let ticket = start_exchange(&rig, false, "第一问");

        let queued = rig
            .session_store
            .submit_exchange(&ticket.session_id, "第二问")
            .unwrap();
        assert!(matches!(queued, SubmitDecision::Queued { position: 1 }));

        rig.worker.launch(ticket.clone());

        // 两次交换都应完成（4 个回合全部落库）
        for _ in 0..300 {
            let session = rig.session_store.get(&ticket.session_id).unwrap();
            if session.conversation.turn_count() == 4 && session.active_request.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let session = rig.session_store.get(&ticket.session_id).unwrap();
        assert_eq!(session.conversation.turn_count(), 4);
        assert!(session.queued_inputs.is_empty());
        let statuses: Vec<TurnStatus> = session
            .conversation
            .turns()
            .iter()
            .map(|t| t.status())
            .collect();
        assert!(statuses.iter().all(|s| *s == TurnStatus::Complete));
    }

    #[tokio::test]
    async fn test_closed_segments_become_cues_in_player_mode() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![
                FakeStep::Delta("第一句话完整。".to_string()),
                FakeStep::Delta("第二句话也完整。".to_string()),
                FakeStep::Delta("尾巴".to_string()),
            ],
            5,
        );
        let ticket = start_exchange(&rig, true, "请朗读");
        rig.worker.launch(ticket.clone());

        wait_for_status(&rig, &ticket, TurnStatus::Complete).await;

        let cues = rig
            .cue_store
            .cues_for_turn(&ticket.session_id, ticket.assistant_turn_id);
        // 两句流式闭合 + 完成时冲出的尾巴
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "第一句话完整。");
        assert_eq!(cues[1].text, "第二句话也完整。");
        assert_eq!(cues[2].text, "尾巴");
        let indices: Vec<usize> = cues.iter().map(|c| c.segment_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_no_cues_when_player_mode_off() {
        let rig = build_rig(
            BusyPolicy::Reject,
            vec![FakeStep::Delta("一句完整的话。".to_string())],
            5,
        );
        let ticket = start_exchange(&rig, false, "请回答");
        rig.worker.launch(ticket.clone());

        wait_for_status(&rig, &ticket, TurnStatus::Complete).await;

        let cues = rig
            .cue_store
            .cues_for_turn(&ticket.session_id, ticket.assistant_turn_id);
        assert!(cues.is_empty());
    }
}
