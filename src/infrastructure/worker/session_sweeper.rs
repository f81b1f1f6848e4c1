//! Session Sweeper - 闲置会话回收
//!
//! 定期扫描最后活动时间超限的会话，停播、取消在途回合并清理提示音。
//! 回收语义与主动关闭一致，订阅端收到 session_closed 事件

use std::sync::Arc;
use tokio::time::Duration;

use crate::application::ports::{CueStorePort, SessionStorePort};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::worker::PlaybackSynchronizer;

/// Session Sweeper 配置
#[derive(Debug, Clone)]
pub struct SessionSweeperConfig {
    /// 是否启用回收
    pub enabled: bool,
    /// 扫描间隔（秒）
    pub interval_secs: u64,
    /// 会话闲置过期时间（秒）
    pub session_expire_secs: u64,
}

impl Default for SessionSweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            session_expire_secs: 1800,
        }
    }
}

/// 闲置会话回收器
pub struct SessionSweeper {
    config: SessionSweeperConfig,
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    playback: Arc<PlaybackSynchronizer>,
    event_publisher: Arc<EventPublisher>,
}

impl SessionSweeper {
    pub fn new(
        config: SessionSweeperConfig,
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        playback: Arc<PlaybackSynchronizer>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            session_store,
            cue_store,
            playback,
            event_publisher,
        }
    }

    /// 启动回收循环
    pub async fn run(self) {
        if !self.config.enabled {
            tracing::info!("SessionSweeper disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            session_expire_secs = self.config.session_expire_secs,
            "SessionSweeper started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        // 启动即触发的第一个 tick 跳过
        interval.tick().await;

        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    /// 单轮扫描
    fn sweep(&self) {
        let expired = self
            .session_store
            .get_expired_sessions(self.config.session_expire_secs);
        if expired.is_empty() {
            return;
        }

        tracing::info!(count = expired.len(), "Sweeping idle sessions");

        for session_id in expired {
            self.playback.stop_session(&session_id);

            match self.session_store.close(&session_id) {
                Ok(cancelled) => {
                    if let Some(outcome) = cancelled {
                        self.event_publisher
                            .publish_turn_cancelled(&session_id, outcome.turn_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to close idle session");
                    continue;
                }
            }

            let discarded = self.cue_store.discard_session(&session_id);
            if discarded > 0 {
                self.event_publisher
                    .publish_cues_discarded(&session_id, None, discarded);
            }
            self.cue_store.cleanup_session(&session_id);

            self.event_publisher
                .publish_session_closed(&session_id, "idle_expired");
            self.event_publisher.unregister_session(&session_id);

            tracing::info!(session_id = %session_id, "Idle session reclaimed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AudioCue;
    use crate::domain::conversation::{ColorScheme, TextSegment, TurnId};
    use crate::infrastructure::adapters::FakeAudioOutput;
    use crate::infrastructure::memory::{
        InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
    };
    use crate::infrastructure::worker::PlaybackSynchronizerConfig;
    use tokio::sync::mpsc;

    fn build_sweeper(
        config: SessionSweeperConfig,
    ) -> (
        SessionSweeper,
        Arc<InMemorySessionStore>,
        Arc<InMemoryCueStore>,
        mpsc::Receiver<String>,
    ) {
        let session_store = InMemorySessionStore::new(SessionStoreConfig::default()).arc();
        let (cue_tx, cue_rx) = mpsc::channel(100);
        let cue_store = InMemoryCueStore::new(cue_tx).arc();
        let event_publisher = EventPublisher::new().arc();
        let playback = PlaybackSynchronizer::new(
            PlaybackSynchronizerConfig::default(),
            session_store.clone(),
            cue_store.clone(),
            Arc::new(FakeAudioOutput::new()),
            event_publisher.clone(),
        )
        .arc();

        let sweeper = SessionSweeper::new(
            config,
            session_store.clone(),
            cue_store.clone(),
            playback,
            event_publisher,
        );
        (sweeper, session_store, cue_store, cue_rx)
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_session() {
        let (sweeper, session_store, cue_store, _rx) = build_sweeper(SessionSweeperConfig {
            enabled: true,
            interval_secs: 60,
            session_expire_secs: 0,
        });

        let session = session_store.create(true, ColorScheme::Light).unwrap();
        let turn_id = TurnId::new();
        let segment = TextSegment::new(0, "待回收的句子。".to_string()).unwrap();
        let cue = AudioCue::new(&session.id, turn_id, &segment);
        let cue_id = cue.cue_id.clone();
        cue_store.submit(vec![cue]).unwrap();

        // expire_secs=0 时任何已流逝的会话视为过期
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.sweep();

        assert!(!session_store.is_valid(&session.id));
        assert!(cue_store.get(&cue_id).is_none());
    }

    #[tokio::test]
    async fn test_sweep_keeps_active_session() {
        let (sweeper, session_store, _cue_store, _rx) = build_sweeper(SessionSweeperConfig {
            enabled: true,
            interval_secs: 60,
            session_expire_secs: 3600,
        });

        let session = session_store.create(false, ColorScheme::Light).unwrap();
        sweeper.sweep();
        assert!(session_store.is_valid(&session.id));
    }
}
