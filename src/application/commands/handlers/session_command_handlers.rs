//! Session Command Handlers

use std::sync::Arc;

use crate::application::commands::session_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{AudioCue, CueStorePort, SessionStorePort};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::worker::PlaybackSynchronizer;

/// OpenSession Handler - 创建会话
pub struct OpenSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
    event_publisher: Arc<EventPublisher>,
    playback: Arc<PlaybackSynchronizer>,
}

impl OpenSessionHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        event_publisher: Arc<EventPublisher>,
        playback: Arc<PlaybackSynchronizer>,
    ) -> Self {
        Self {
            session_store,
            event_publisher,
            playback,
        }
    }

    pub async fn handle(
        &self,
        cmd: OpenSessionCommand,
    ) -> Result<OpenSessionResponse, ApplicationError> {
        let session = self
            .session_store
            .create(cmd.player_mode, cmd.color_scheme)?;

        self.event_publisher.register_session(&session.id);
        if session.player_mode {
            self.playback.start_session(&session.id);
        }
        self.event_publisher.publish_session_opened(&session.id);

        tracing::info!(
            session_id = %session.id,
            player_mode = session.player_mode,
            color_scheme = session.color_scheme.as_str(),
            "Session opened"
        );

        Ok(OpenSessionResponse {
            session_id: session.id,
            player_mode: session.player_mode,
            color_scheme: session.color_scheme,
        })
    }
}

/// CloseSession Handler - 关闭会话
pub struct CloseSessionHandler {
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    event_publisher: Arc<EventPublisher>,
    playback: Arc<PlaybackSynchronizer>,
}

impl CloseSessionHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        event_publisher: Arc<EventPublisher>,
        playback: Arc<PlaybackSynchronizer>,
    ) -> Self {
        Self {
            session_store,
            cue_store,
            event_publisher,
            playback,
        }
    }

    pub async fn handle(
        &self,
        cmd: CloseSessionCommand,
    ) -> Result<CloseSessionResponse, ApplicationError> {
        // 关闭会话，在途回合的令牌在存储内一并取消
        let cancelled = self.session_store.close(&cmd.session_id)?;

        if let Some(outcome) = &cancelled {
            self.event_publisher.publish_turn_cancelled(
                &cmd.session_id,
                outcome.turn_id,
            );
        }

        // 停止叙播并废弃全部提示音
        self.playback.stop_session(&cmd.session_id);
        let discarded_cues = self.cue_store.discard_session(&cmd.session_id);
        self.cue_store.cleanup_session(&cmd.session_id);

        self.event_publisher
            .publish_session_closed(&cmd.session_id, "client_close");
        self.event_publisher.unregister_session(&cmd.session_id);

        tracing::info!(
            session_id = %cmd.session_id,
            cancelled_turn = cancelled.is_some(),
            discarded_cues = discarded_cues,
            "Session closed"
        );

        Ok(CloseSessionResponse {
            session_id: cmd.session_id,
            cancelled_turn: cancelled.is_some(),
            discarded_cues,
        })
    }
}

/// SetPlayerMode Handler - 叙播开关
///
/// 开启时为进行中回合的已闭合句子补建提示音（不等待回合完成）；
/// 关闭时立即停止播放并废弃会话的全部未完结提示音
pub struct SetPlayerModeHandler {
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    event_publisher: Arc<EventPublisher>,
    playback: Arc<PlaybackSynchronizer>,
}

impl SetPlayerModeHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        event_publisher: Arc<EventPublisher>,
        playback: Arc<PlaybackSynchronizer>,
    ) -> Self {
        Self {
            session_store,
            cue_store,
            event_publisher,
            playback,
        }
    }

    pub async fn handle(
        &self,
        cmd: SetPlayerModeCommand,
    ) -> Result<SetPlayerModeResponse, ApplicationError> {
        let change = self
            .session_store
            .set_player_mode(&cmd.session_id, cmd.enabled)?;

        let mut discarded_cues = 0;
        let mut backfilled_cues = 0;

        if change.changed {
            if change.enabled {
                backfilled_cues = self.backfill_in_flight(&cmd.session_id, &change)?;
                self.playback.start_session(&cmd.session_id);
            } else {
                self.playback.stop_session(&cmd.session_id);
                discarded_cues = self.cue_store.discard_session(&cmd.session_id);
                if discarded_cues > 0 {
                    self.event_publisher
                        .publish_cues_discarded(&cmd.session_id, None, discarded_cues);
                }
            }
            self.event_publisher
                .publish_player_mode(&cmd.session_id, change.enabled);
        }

        tracing::info!(
            session_id = %cmd.session_id,
            enabled = cmd.enabled,
            changed = change.changed,
            discarded_cues = discarded_cues,
            backfilled_cues = backfilled_cues,
            "Player mode updated"
        );

        Ok(SetPlayerModeResponse {
            session_id: cmd.session_id,
            enabled: cmd.enabled,
            changed: change.changed,
            discarded_cues,
            backfilled_cues,
        })
    }

    /// 为进行中回合已闭合且尚无提示音的句子补建提示音
    fn backfill_in_flight(
        &self,
        session_id: &str,
        change: &crate::application::ports::PlayerModeChange,
    ) -> Result<usize, ApplicationError> {
        let Some((turn_id, segments)) = &change.in_flight else {
            return Ok(0);
        };

        let missing: Vec<AudioCue> = segments
            .iter()
            .filter(|seg| {
                self.cue_store
                    .get_by_position(session_id, *turn_id, seg.index())
                    .is_none()
            })
            .map(|seg| AudioCue::new(session_id, *turn_id, seg))
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let cues = missing.clone();
        let ids = self.cue_store.submit(missing)?;
        for cue in &cues {
            self.event_publisher.publish_cue_state(cue);
        }
        Ok(ids.len())
    }
}

/// SetColorScheme Handler - 配色切换
pub struct SetColorSchemeHandler {
    session_store: Arc<dyn SessionStorePort>,
    event_publisher: Arc<EventPublisher>,
}

impl SetColorSchemeHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            session_store,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: SetColorSchemeCommand,
    ) -> Result<SetColorSchemeResponse, ApplicationError> {
        self.session_store
            .set_color_scheme(&cmd.session_id, cmd.scheme)?;
        self.event_publisher
            .publish_color_scheme(&cmd.session_id, cmd.scheme);

        tracing::debug!(
            session_id = %cmd.session_id,
            scheme = cmd.scheme.as_str(),
            "Color scheme updated"
        );

        Ok(SetColorSchemeResponse {
            session_id: cmd.session_id,
            scheme: cmd.scheme,
        })
    }
}

/// SetMute Handler - 静音开关
///
/// 只改状态并广播；设备暂停/恢复由播放同步器响应事件执行
pub struct SetMuteHandler {
    session_store: Arc<dyn SessionStorePort>,
    event_publisher: Arc<EventPublisher>,
}

impl SetMuteHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            session_store,
            event_publisher,
        }
    }

    pub async fn handle(&self, cmd: SetMuteCommand) -> Result<SetMuteResponse, ApplicationError> {
        let changed = self.session_store.set_muted(&cmd.session_id, cmd.muted)?;
        if changed {
            self.event_publisher
                .publish_player_muted(&cmd.session_id, cmd.muted);
        }

        tracing::debug!(
            session_id = %cmd.session_id,
            muted = cmd.muted,
            "Mute updated"
        );

        Ok(SetMuteResponse {
            session_id: cmd.session_id,
            muted: cmd.muted,
            changed,
        })
    }
}
