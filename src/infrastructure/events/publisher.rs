//! Event Publisher Implementation
//!
//! WebSocket 事件推送实现。会话事件走每会话 broadcast 通道，
//! 凭据等进程级事件走全局通道

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::AudioCue;
use crate::domain::conversation::{ColorScheme, TurnFailure, TurnId, TurnStatus};

/// WebSocket 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WsEvent {
    /// 新回合入列
    TurnCreated {
        session_id: String,
        turn_id: String,
        role: String,
    },
    /// 流式文本增量
    TurnDelta {
        session_id: String,
        turn_id: String,
        delta: String,
    },
    /// 回合状态变更
    TurnStatusChanged {
        session_id: String,
        turn_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure_kind: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure_message: Option<String>,
    },
    /// 提示音状态变更
    CueStateChanged {
        session_id: String,
        turn_id: String,
        cue_id: String,
        segment_index: usize,
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// 提示音批量废弃
    CuesDiscarded {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_id: Option<String>,
        count: usize,
    },
    /// 某片段开始播放
    PlaybackStarted {
        session_id: String,
        turn_id: String,
        segment_index: usize,
    },
    /// 播放头等待下一片段合成完成
    PlaybackWaiting {
        session_id: String,
        turn_id: String,
        segment_index: usize,
    },
    /// 回合的全部提示音播放完结
    PlaybackFinished {
        session_id: String,
        turn_id: String,
    },
    /// 叙播开关变更
    PlayerModeChanged {
        session_id: String,
        enabled: bool,
    },
    /// 静音开关变更
    PlayerMuted {
        session_id: String,
        muted: bool,
    },
    /// 播放设备故障，叙播已锁定
    PlayerDisabled {
        session_id: String,
        reason: String,
    },
    /// 配色切换
    ColorSchemeChanged {
        session_id: String,
        scheme: String,
    },
    /// 会话关闭
    SessionClosed {
        session_id: String,
        reason: String,
    },
    /// 会话创建（全局广播）
    SessionOpened {
        session_id: String,
    },
    /// 凭据变更（全局广播）
    CredentialChanged {
        present: bool,
    },
}

/// 会话事件通道及其注册计数
///
/// 会话打开时持有一份注册，每个已连接的客户端各持有一份；
/// 单个客户端断开只释放自己的注册，不拆除其他订阅者的通道
struct SessionChannel {
    sender: broadcast::Sender<WsEvent>,
    registrations: usize,
}

/// 事件发布器
pub struct EventPublisher {
    /// session_id -> 会话事件通道
    session_channels: DashMap<String, SessionChannel>,
    /// Global broadcast channel for process-wide events
    global_channel: broadcast::Sender<WsEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(100);
        Self {
            session_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全局事件（SessionOpened/CredentialChanged）
    pub fn subscribe_global(&self) -> broadcast::Receiver<WsEvent> {
        self.global_channel.subscribe()
    }

    /// 注册会话的事件通道，通道已存在时追加一份注册
    pub fn register_session(&self, session_id: &str) -> broadcast::Receiver<WsEvent> {
        use dashmap::mapref::entry::Entry;

        match self.session_channels.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let channel = entry.get_mut();
                channel.registrations += 1;
                channel.sender.subscribe()
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = broadcast::channel(100);
                entry.insert(SessionChannel {
                    sender: tx,
                    registrations: 1,
                });
                rx
            }
        }
    }

    /// 释放一份注册；最后一份释放时才拆除通道
    pub fn unregister_session(&self, session_id: &str) {
        if let Some(mut channel) = self.session_channels.get_mut(session_id) {
            channel.registrations = channel.registrations.saturating_sub(1);
            if channel.registrations > 0 {
                return;
            }
        } else {
            return;
        }
        self.session_channels
            .remove_if(session_id, |_, channel| channel.registrations == 0);
    }

    /// 获取会话的事件接收器（不增加注册计数）
    pub fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<WsEvent>> {
        self.session_channels
            .get(session_id)
            .map(|channel| channel.sender.subscribe())
    }

    /// 发布回合创建事件
    pub fn publish_turn_created(&self, session_id: &str, turn_id: TurnId, role: &str) {
        self.publish_to_session(
            session_id,
            WsEvent::TurnCreated {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                role: role.to_string(),
            },
        );
    }

    /// 发布文本增量事件
    pub fn publish_turn_delta(&self, session_id: &str, turn_id: TurnId, delta: &str) {
        self.publish_to_session(
            session_id,
            WsEvent::TurnDelta {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                delta: delta.to_string(),
            },
        );
    }

    /// 发布回合状态变更事件
    pub fn publish_turn_status(
        &self,
        session_id: &str,
        turn_id: TurnId,
        status: TurnStatus,
        failure: Option<&TurnFailure>,
    ) {
        self.publish_to_session(
            session_id,
            WsEvent::TurnStatusChanged {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                status: status.as_str().to_string(),
                failure_kind: failure.map(|f| f.kind.as_str().to_string()),
                failure_message: failure.map(|f| f.message.clone()),
            },
        );
    }

    /// 发布回合取消事件
    pub fn publish_turn_cancelled(&self, session_id: &str, turn_id: TurnId) {
        self.publish_turn_status(session_id, turn_id, TurnStatus::Cancelled, None);
    }

    /// 发布提示音状态变更事件
    pub fn publish_cue_state(&self, cue: &AudioCue) {
        self.publish_to_session(
            &cue.session_id,
            WsEvent::CueStateChanged {
                session_id: cue.session_id.clone(),
                turn_id: cue.turn_id.to_string(),
                cue_id: cue.cue_id.clone(),
                segment_index: cue.segment_index,
                state: cue.state.as_str().to_string(),
                error: cue.error_message.clone(),
            },
        );
    }

    /// 发布提示音批量废弃事件
    pub fn publish_cues_discarded(&self, session_id: &str, turn_id: Option<TurnId>, count: usize) {
        self.publish_to_session(
            session_id,
            WsEvent::CuesDiscarded {
                session_id: session_id.to_string(),
                turn_id: turn_id.map(|t| t.to_string()),
                count,
            },
        );
    }

    /// 发布片段开始播放事件
    pub fn publish_playback_started(&self, session_id: &str, turn_id: TurnId, segment_index: usize) {
        self.publish_to_session(
            session_id,
            WsEvent::PlaybackStarted {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                segment_index,
            },
        );
    }

    /// 发布播放等待事件
    pub fn publish_playback_waiting(&self, session_id: &str, turn_id: TurnId, segment_index: usize) {
        self.publish_to_session(
            session_id,
            WsEvent::PlaybackWaiting {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
                segment_index,
            },
        );
    }

    /// 发布回合播放完结事件
    pub fn publish_playback_finished(&self, session_id: &str, turn_id: TurnId) {
        self.publish_to_session(
            session_id,
            WsEvent::PlaybackFinished {
                session_id: session_id.to_string(),
                turn_id: turn_id.to_string(),
            },
        );
    }

    /// 发布叙播开关事件
    pub fn publish_player_mode(&self, session_id: &str, enabled: bool) {
        self.publish_to_session(
            session_id,
            WsEvent::PlayerModeChanged {
                session_id: session_id.to_string(),
                enabled,
            },
        );
    }

    /// 发布静音开关事件
    pub fn publish_player_muted(&self, session_id: &str, muted: bool) {
        self.publish_to_session(
            session_id,
            WsEvent::PlayerMuted {
                session_id: session_id.to_string(),
                muted,
            },
        );
    }

    /// 发布设备故障事件
    pub fn publish_player_disabled(&self, session_id: &str, reason: &str) {
        self.publish_to_session(
            session_id,
            WsEvent::PlayerDisabled {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    /// 发布配色切换事件
    pub fn publish_color_scheme(&self, session_id: &str, scheme: ColorScheme) {
        self.publish_to_session(
            session_id,
            WsEvent::ColorSchemeChanged {
                session_id: session_id.to_string(),
                scheme: scheme.as_str().to_string(),
            },
        );
    }

    /// 发布会话关闭事件
    pub fn publish_session_closed(&self, session_id: &str, reason: &str) {
        self.publish_to_session(
            session_id,
            WsEvent::SessionClosed {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    /// 发布会话创建事件（全局广播）
    pub fn publish_session_opened(&self, session_id: &str) {
        let event = WsEvent::SessionOpened {
            session_id: session_id.to_string(),
        };
        if let Err(e) = self.global_channel.send(event) {
            tracing::debug!(
                session_id = %session_id,
                error = %e,
                "Failed to publish SessionOpened event (no receivers)"
            );
        }
    }

    /// 发布凭据变更事件（全局广播）
    pub fn publish_credential_changed(&self, present: bool) {
        let event = WsEvent::CredentialChanged { present };
        if let Err(e) = self.global_channel.send(event) {
            tracing::debug!(
                present = present,
                error = %e,
                "Failed to publish CredentialChanged event (no receivers)"
            );
        }
    }

    /// 发布事件到指定会话
    fn publish_to_session(&self, session_id: &str, event: WsEvent) {
        if let Some(channel) = self.session_channels.get(session_id) {
            if let Err(e) = channel.sender.send(event) {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to publish event (no receivers)"
                );
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_detach_keeps_channel_for_remaining_subscribers() {
        let publisher = EventPublisher::new();
        let _session_rx = publisher.register_session("s1");
        let mut client_b = publisher.register_session("s1");
        let _client_a = publisher.register_session("s1");

        // 客户端 A 断开，B 仍收得到事件
        publisher.unregister_session("s1");
        publisher.publish_session_closed("s1", "user_closed");
        let event = client_b.recv().await.unwrap();
        assert!(matches!(event, WsEvent::SessionClosed { .. }));

        // 余下注册全部释放后通道才拆除
        publisher.unregister_session("s1");
        publisher.unregister_session("s1");
        assert!(publisher.subscribe("s1").is_none());
    }

    #[tokio::test]
    async fn test_unregister_unknown_session_is_noop() {
        let publisher = EventPublisher::new();
        publisher.unregister_session("missing");
        assert!(publisher.subscribe("missing").is_none());
    }
}
