//! Playback Synchronizer - 叙播播放推进器
//!
//! 每个开启叙播的会话一个后台任务，独占驱动音频输出设备。
//! 合成结果可乱序就绪，这里严格按 (回合顺序, 片段索引) 推进：
//! 下一段未就绪时进入等待子状态，绝不跳序播放。
//! 推进方式为无游标重扫，取消/补建后无需修正游标

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioCue, AudioOutputPort, CueState, CueStorePort, PlaybackEnd, PlaybackError,
    SessionStorePort,
};
use crate::domain::conversation::{TurnId, TurnRole};
use crate::infrastructure::events::EventPublisher;

/// Playback Synchronizer 配置
#[derive(Debug, Clone)]
pub struct PlaybackSynchronizerConfig {
    /// 等待/重扫的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for PlaybackSynchronizerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
        }
    }
}

/// 一次扫描选出的动作
enum StepAction {
    /// 播放就绪的提示音
    Play(AudioCue),
    /// 下一段未就绪，等待
    Wait(TurnId, usize),
    /// 暂无可动作位置
    Idle,
}

/// 播放同步器
///
/// start_session / stop_session 由命令处理器调用；
/// 设备级故障时自行关闭并锁定会话叙播
pub struct PlaybackSynchronizer {
    config: PlaybackSynchronizerConfig,
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    audio_output: Arc<dyn AudioOutputPort>,
    event_publisher: Arc<EventPublisher>,
    /// session_id -> (任务代, 取消令牌)
    tasks: DashMap<String, (u64, CancellationToken)>,
    next_task_id: AtomicU64,
    /// 设备租约: 输出设备进程内唯一，同一时刻只有一个会话持有
    device_lease: tokio::sync::Mutex<()>,
    /// 当前持有设备的会话
    device_owner: std::sync::Mutex<Option<String>>,
}

impl PlaybackSynchronizer {
    pub fn new(
        config: PlaybackSynchronizerConfig,
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        audio_output: Arc<dyn AudioOutputPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            session_store,
            cue_store,
            audio_output,
            event_publisher,
            tasks: DashMap::new(),
            next_task_id: AtomicU64::new(0),
            device_lease: tokio::sync::Mutex::new(()),
            device_owner: std::sync::Mutex::new(None),
        }
    }

    fn owns_device(&self, session_id: &str) -> bool {
        self.device_owner
            .lock()
            .map(|owner| owner.as_deref() == Some(session_id))
            .unwrap_or(false)
    }

    fn set_device_owner(&self, session_id: Option<&str>) {
        if let Ok(mut owner) = self.device_owner.lock() {
            *owner = session_id.map(str::to_string);
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 为会话启动播放任务（已存在则不重复启动）
    pub fn start_session(self: &Arc<Self>, session_id: &str) {
        use dashmap::mapref::entry::Entry;

        match self.tasks.entry(session_id.to_string()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
                let token = CancellationToken::new();
                entry.insert((task_id, token.clone()));

                let this = self.clone();
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    this.run_session(session_id, task_id, token).await;
                });
                tracing::debug!(task_id = task_id, "Playback task started");
            }
        }
    }

    /// 停止会话的播放任务，在播音频立即打断
    pub fn stop_session(&self, session_id: &str) {
        if let Some((_, (task_id, token))) = self.tasks.remove(session_id) {
            token.cancel();
            // 只打断本会话持有的设备；其他会话的在播片段不受波及
            if self.owns_device(session_id) {
                self.audio_output.stop();
            }
            tracing::debug!(session_id = %session_id, task_id = task_id, "Playback task stopped");
        }
    }

    /// 会话播放主循环: 重扫 → 动作 → 重扫
    async fn run_session(self: Arc<Self>, session_id: String, task_id: u64, token: CancellationToken) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        // 完结播报去重: 回合终结与尾段提示音入册之间有窗口，
        // 终结回合不从重扫中剔除，迟到的尾段仍会被扫到并播出
        let mut announced_turns: HashSet<TurnId> = HashSet::new();
        // 等待事件去重: 同一 (回合, 片段) 只播报一次
        let mut last_waiting: Option<(TurnId, usize)> = None;

        loop {
            if token.is_cancelled() {
                break;
            }
            let session = match self.session_store.get(&session_id) {
                Ok(s) => s,
                Err(_) => break,
            };
            if !session.player_mode {
                break;
            }

            let mut action = StepAction::Idle;
            for turn in session.conversation.turns() {
                if turn.role() != TurnRole::Assistant {
                    continue;
                }
                let turn_id = turn.id();

                let cues = self.cue_store.cues_for_turn(&session_id, turn_id);
                let cue_count = cues.len();
                let mut all_terminal = true;
                let mut any_done = false;
                for cue in cues {
                    match cue.state {
                        CueState::Done => any_done = true,
                        CueState::Errored | CueState::Cancelled => {}
                        CueState::Ready => {
                            action = StepAction::Play(cue);
                            all_terminal = false;
                            break;
                        }
                        // 未就绪片段挡住后续，严格按索引推进
                        CueState::Queued | CueState::Loading | CueState::Playing => {
                            action = StepAction::Wait(turn_id, cue.segment_index);
                            all_terminal = false;
                            break;
                        }
                    }
                }

                if !all_terminal {
                    break;
                }
                if turn.status().is_terminal() {
                    // 提示音覆盖全部片段且至少播出一段时播报完结，继续扫后续回合
                    if any_done
                        && cue_count >= turn.segment_count()
                        && announced_turns.insert(turn_id)
                    {
                        self.event_publisher
                            .publish_playback_finished(&session_id, turn_id);
                        tracing::info!(
                            session_id = %session_id,
                            turn_id = %turn_id,
                            "Turn playback finished"
                        );
                    }
                    continue;
                }
                // 在途回合: 已有片段全部完结，等待流闭合新片段
                break;
            }

            match action {
                StepAction::Play(cue) => {
                    last_waiting = None;
                    if !self.play_cue(&session_id, &cue, &token).await {
                        break;
                    }
                }
                StepAction::Wait(turn_id, segment_index) => {
                    if last_waiting != Some((turn_id, segment_index)) {
                        last_waiting = Some((turn_id, segment_index));
                        self.event_publisher
                            .publish_playback_waiting(&session_id, turn_id, segment_index);
                        tracing::debug!(
                            session_id = %session_id,
                            turn_id = %turn_id,
                            segment_index = segment_index,
                            "Playback waiting for segment"
                        );
                    }
                    tokio::time::sleep(poll).await;
                }
                StepAction::Idle => {
                    last_waiting = None;
                    tokio::time::sleep(poll).await;
                }
            }
        }

        // 仅移除自己这一代的登记，避免误删后续重启的任务
        self.tasks
            .remove_if(&session_id, |_, (id, _)| *id == task_id);
        tracing::debug!(session_id = %session_id, task_id = task_id, "Playback task exited");
    }

    /// 播放单个提示音，返回 false 表示任务应退出
    async fn play_cue(&self, session_id: &str, cue: &AudioCue, token: &CancellationToken) -> bool {
        // 先取设备租约；等待期间被取消则直接退出
        let _lease = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            guard = self.device_lease.lock() => guard,
        };
        self.set_device_owner(Some(session_id));
        let keep_running = self.drive_device(session_id, cue, token).await;
        self.set_device_owner(None);
        keep_running
    }

    /// 持有设备租约期间驱动一次播放
    async fn drive_device(&self, session_id: &str, cue: &AudioCue, token: &CancellationToken) -> bool {
        let audio = match self.cue_store.take_audio(&cue.cue_id) {
            Some(audio) => audio,
            // 就绪后又被废弃，重扫
            None => return true,
        };
        if self.cue_store.set_state(&cue.cue_id, CueState::Playing).is_err() {
            return true;
        }
        if let Some(playing) = self.cue_store.get(&cue.cue_id) {
            self.event_publisher.publish_cue_state(&playing);
        }
        self.event_publisher
            .publish_playback_started(session_id, cue.turn_id, cue.segment_index);

        // 起播时对齐静音状态
        let mut muted = self
            .session_store
            .get(session_id)
            .map(|s| s.muted)
            .unwrap_or(false);
        if muted {
            self.audio_output.pause();
        } else {
            self.audio_output.resume();
        }

        let play_fut = self.audio_output.play(audio);
        tokio::pin!(play_fut);
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    self.audio_output.stop();
                    let _ = (&mut play_fut).await;
                    return false;
                }

                result = &mut play_fut => {
                    return self.settle_play(session_id, cue, result);
                }

                _ = tick.tick() => {
                    // 播放期间提示音被废弃（回合取消等），立即打断
                    if self.cue_store.is_cancelled(&cue.cue_id) {
                        self.audio_output.stop();
                        let _ = (&mut play_fut).await;
                        return true;
                    }
                    // 轮询静音开关
                    if let Ok(session) = self.session_store.get(session_id) {
                        if session.muted != muted {
                            muted = session.muted;
                            if muted {
                                self.audio_output.pause();
                            } else {
                                self.audio_output.resume();
                            }
                        }
                    }
                }
            }
        }
    }

    /// 处理一次播放的结束，返回 false 表示任务应退出
    fn settle_play(
        &self,
        session_id: &str,
        cue: &AudioCue,
        result: Result<PlaybackEnd, PlaybackError>,
    ) -> bool {
        match result {
            Ok(PlaybackEnd::Completed) => {
                if self.cue_store.set_state(&cue.cue_id, CueState::Done).is_ok() {
                    if let Some(done) = self.cue_store.get(&cue.cue_id) {
                        self.event_publisher.publish_cue_state(&done);
                    }
                }
                true
            }
            Ok(PlaybackEnd::Stopped) => {
                // 外部打断，废弃由打断方登记
                let _ = self.cue_store.set_state(&cue.cue_id, CueState::Cancelled);
                true
            }
            Err(PlaybackError::DecodeFailed(message)) => {
                // 单段解码失败，标记后跳过继续
                tracing::warn!(
                    session_id = %session_id,
                    cue_id = %cue.cue_id,
                    segment_index = cue.segment_index,
                    error = %message,
                    "Audio decode failed, skipping segment"
                );
                if self.cue_store.set_errored(&cue.cue_id, message).is_ok() {
                    if let Some(errored) = self.cue_store.get(&cue.cue_id) {
                        self.event_publisher.publish_cue_state(&errored);
                    }
                }
                true
            }
            Err(PlaybackError::DeviceUnavailable(message)) => {
                // 设备级故障: 关闭并锁定本会话叙播，废弃全部未完结提示音
                tracing::error!(
                    session_id = %session_id,
                    error = %message,
                    "Audio device failed, disabling player for session"
                );
                let _ = self.cue_store.set_errored(&cue.cue_id, message.clone());
                if let Ok(changed) = self.session_store.lock_player(session_id) {
                    if changed {
                        self.event_publisher
                            .publish_player_disabled(session_id, &message);
                    }
                }
                let discarded = self.cue_store.discard_session(session_id);
                if discarded > 0 {
                    self.event_publisher
                        .publish_cues_discarded(session_id, None, discarded);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        SessionError, SubmitDecision, SynthesizedAudio,
    };
    use crate::domain::conversation::{ColorScheme, TextSegment};
    use crate::infrastructure::adapters::FakeAudioOutput;
    use crate::infrastructure::memory::{
        InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
    };
    use tokio::sync::mpsc;

    struct Rig {
        session_store: Arc<InMemorySessionStore>,
        cue_store: Arc<InMemoryCueStore>,
        audio_output: Arc<FakeAudioOutput>,
        playback: Arc<PlaybackSynchronizer>,
        // 保持合成队列接收端存活
        _cue_rx: mpsc::Receiver<String>,
    }

    fn build_rig(audio_output: FakeAudioOutput) -> Rig {
        let session_store = InMemorySessionStore::new(SessionStoreConfig::default()).arc();
        let (cue_tx, cue_rx) = mpsc::channel(100);
        let cue_store = InMemoryCueStore::new(cue_tx).arc();
        let audio_output = Arc::new(audio_output);
        let event_publisher = EventPublisher::new().arc();

        let playback = PlaybackSynchronizer::new(
            PlaybackSynchronizerConfig {
                poll_interval_ms: 5,
            },
            session_store.clone(),
            cue_store.clone(),
            audio_output.clone(),
            event_publisher,
        )
        .arc();

        Rig {
            session_store,
            cue_store,
            audio_output,
            playback,
            _cue_rx: cue_rx,
        }
    }

    /// 创建开启叙播的会话并打开一个助手回合
    fn seed_exchange(rig: &Rig) -> (String, TurnId) {
        let session = rig.session_store.create(true, ColorScheme::Dark).unwrap();
        let decision = rig
            .session_store
            .submit_exchange(&session.id, "给我讲一个很短的故事吧。")
            .unwrap();
        match decision {
            SubmitDecision::Started(ticket) => (session.id, ticket.assistant_turn_id),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    fn submit_cue(rig: &Rig, session_id: &str, turn_id: TurnId, index: usize, text: &str) -> String {
        let segment = TextSegment::new(index, text.to_string()).unwrap();
        let cue = AudioCue::new(session_id, turn_id, &segment);
        let cue_id = cue.cue_id.clone();
        rig.cue_store.submit(vec![cue]).unwrap();
        cue_id
    }

    fn make_ready(rig: &Rig, cue_id: &str, text: &str, duration_ms: u64) {
        rig.cue_store.set_state(cue_id, CueState::Loading).unwrap();
        rig.cue_store
            .set_ready(
                cue_id,
                SynthesizedAudio {
                    audio_data: text.as_bytes().to_vec(),
                    duration_ms: Some(duration_ms),
                    sample_rate: Some(16000),
                },
            )
            .unwrap();
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never satisfied");
    }

    #[tokio::test]
    async fn test_plays_strictly_in_index_order() {
        let rig = build_rig(FakeAudioOutput::new().with_default_duration(10));
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "第一句。");
        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "第二句。");
        // 后一段先就绪，不得先播
        make_ready(&rig, &cue1, "第二句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rig.audio_output.played_texts().is_empty());
        assert_eq!(rig.cue_store.get(&cue1).unwrap().state, CueState::Ready);

        make_ready(&rig, &cue0, "第一句。", 10);
        wait_until(|| rig.cue_store.get(&cue1).map(|c| c.state) == Some(CueState::Done)).await;

        assert_eq!(rig.audio_output.played_texts(), vec!["第一句。", "第二句。"]);
        assert_eq!(rig.cue_store.get(&cue0).unwrap().state, CueState::Done);
    }

    #[tokio::test]
    async fn test_errored_segment_skipped_and_next_plays() {
        let rig = build_rig(FakeAudioOutput::new().with_default_duration(10));
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "第一句。");
        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "坏掉的第二句。");
        let cue2 = submit_cue(&rig, &session_id, turn_id, 2, "第三句。");
        make_ready(&rig, &cue0, "第一句。", 10);
        rig.cue_store.set_state(&cue1, CueState::Loading).unwrap();
        rig.cue_store
            .set_errored(&cue1, "synthesis failed".to_string())
            .unwrap();
        make_ready(&rig, &cue2, "第三句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue2).map(|c| c.state) == Some(CueState::Done)).await;

        assert_eq!(rig.audio_output.played_texts(), vec!["第一句。", "第三句。"]);
        assert_eq!(rig.cue_store.get(&cue1).unwrap().state, CueState::Errored);
    }

    #[tokio::test]
    async fn test_decode_failure_skips_segment() {
        let rig = build_rig(
            FakeAudioOutput::new()
                .with_default_duration(10)
                .fail_decode_for("不可解码。"),
        );
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "不可解码。");
        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "第二句。");
        make_ready(&rig, &cue0, "不可解码。", 10);
        make_ready(&rig, &cue1, "第二句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue1).map(|c| c.state) == Some(CueState::Done)).await;

        assert_eq!(rig.cue_store.get(&cue0).unwrap().state, CueState::Errored);
        assert_eq!(rig.audio_output.played_texts(), vec!["第二句。"]);
    }

    #[tokio::test]
    async fn test_stop_session_interrupts_playback() {
        let rig = build_rig(FakeAudioOutput::new());
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "很长很长的一句。");
        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "不该播到的一句。");
        make_ready(&rig, &cue0, "很长很长的一句。", 5000);
        make_ready(&rig, &cue1, "不该播到的一句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue0).map(|c| c.state) == Some(CueState::Playing)).await;

        rig.playback.stop_session(&session_id);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(rig.audio_output.played_texts(), vec!["很长很长的一句。"]);
        assert_ne!(rig.cue_store.get(&cue1).unwrap().state, CueState::Done);
    }

    #[tokio::test]
    async fn test_device_failure_locks_player() {
        let rig = build_rig(FakeAudioOutput::new().fail_device_on_call(0));
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "第一句。");
        make_ready(&rig, &cue0, "第一句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| {
            rig.session_store
                .get(&session_id)
                .map(|s| s.player_locked)
                .unwrap_or(false)
        })
        .await;

        let session = rig.session_store.get(&session_id).unwrap();
        assert!(!session.player_mode);
        // 锁定后叙播不可再开启
        let err = rig.session_store.set_player_mode(&session_id, true);
        assert!(matches!(err, Err(SessionError::PlayerLocked(_))));
    }

    #[tokio::test]
    async fn test_mute_pauses_and_resume_completes() {
        let rig = build_rig(FakeAudioOutput::new());
        let (session_id, turn_id) = seed_exchange(&rig);
        rig.session_store.set_muted(&session_id, true).unwrap();

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "静音时不走带。");
        make_ready(&rig, &cue0, "静音时不走带。", 80);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue0).map(|c| c.state) == Some(CueState::Playing)).await;

        // 静音下播放位置保持
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rig.cue_store.get(&cue0).unwrap().state, CueState::Playing);
        assert!(rig.audio_output.is_paused());

        rig.session_store.set_muted(&session_id, false).unwrap();
        wait_until(|| rig.cue_store.get(&cue0).map(|c| c.state) == Some(CueState::Done)).await;
    }

    #[tokio::test]
    async fn test_playback_stops_when_player_mode_disabled() {
        let rig = build_rig(FakeAudioOutput::new().with_default_duration(10));
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "第一句。");
        make_ready(&rig, &cue0, "第一句。", 10);

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue0).map(|c| c.state) == Some(CueState::Done)).await;

        // 关闭叙播后任务自行退出，后续就绪片段不再播放
        rig.session_store.set_player_mode(&session_id, false).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "第二句。");
        make_ready(&rig, &cue1, "第二句。", 10);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(rig.cue_store.get(&cue1).unwrap().state, CueState::Ready);
        assert_eq!(rig.audio_output.played_texts(), vec!["第一句。"]);
    }

    #[tokio::test]
    async fn test_stop_session_leaves_other_session_playing() {
        let rig = build_rig(FakeAudioOutput::new().with_default_duration(10));
        let (session_a, turn_a) = seed_exchange(&rig);
        let (session_b, turn_b) = seed_exchange(&rig);

        let cue_a = submit_cue(&rig, &session_a, turn_a, 0, "甲会话的一句。");
        make_ready(&rig, &cue_a, "甲会话的一句。", 10);
        rig.session_store.complete_turn(&session_a, turn_a).unwrap();

        let cue_b = submit_cue(&rig, &session_b, turn_b, 0, "乙会话很长的一句。");
        make_ready(&rig, &cue_b, "乙会话很长的一句。", 500);
        rig.session_store.complete_turn(&session_b, turn_b).unwrap();

        rig.playback.start_session(&session_a);
        wait_until(|| rig.cue_store.get(&cue_a).map(|c| c.state) == Some(CueState::Done)).await;

        rig.playback.start_session(&session_b);
        wait_until(|| rig.cue_store.get(&cue_b).map(|c| c.state) == Some(CueState::Playing)).await;

        // 停掉甲会话不得波及乙会话的在播片段
        rig.playback.stop_session(&session_a);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rig.cue_store.get(&cue_b).unwrap().state, CueState::Playing);

        wait_until(|| rig.cue_store.get(&cue_b).map(|c| c.state) == Some(CueState::Done)).await;
        assert_eq!(
            rig.audio_output.played_texts(),
            vec!["甲会话的一句。", "乙会话很长的一句。"]
        );
    }

    #[tokio::test]
    async fn test_tail_cue_after_turn_completion_still_plays() {
        let rig = build_rig(FakeAudioOutput::new().with_default_duration(10));
        let (session_id, turn_id) = seed_exchange(&rig);

        let cue0 = submit_cue(&rig, &session_id, turn_id, 0, "第一句。");
        make_ready(&rig, &cue0, "第一句。", 10);
        rig.session_store.complete_turn(&session_id, turn_id).unwrap();

        rig.playback.start_session(&session_id);
        wait_until(|| rig.cue_store.get(&cue0).map(|c| c.state) == Some(CueState::Done)).await;

        // 回合终结与尾段提示音入册之间存在窗口，迟到的尾段也必须播出
        let cue1 = submit_cue(&rig, &session_id, turn_id, 1, "迟到的尾段。");
        make_ready(&rig, &cue1, "迟到的尾段。", 10);
        wait_until(|| rig.cue_store.get(&cue1).map(|c| c.state) == Some(CueState::Done)).await;

        assert_eq!(
            rig.audio_output.played_texts(),
            vec!["第一句。", "迟到的尾段。"]
        );
    }
}
