//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelTurnHandler, ClearCredentialHandler, CloseSessionHandler, OpenSessionHandler,
    SetColorSchemeHandler, SetCredentialHandler, SetMuteHandler, SetPlayerModeHandler,
    SubmitTurnHandler,
    // Query handlers
    GetNarrationStatusHandler, GetSessionHandler, ListSessionsHandler,
    // Ports
    CredentialStorePort, CueStorePort, SessionStorePort,
};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::worker::{PlaybackSynchronizer, StreamWorker};

/// 应用状态
///
/// 会话与提示音均为内存实现，随进程生灭
pub struct AppState {
    // ========== Ports ==========
    pub session_store: Arc<dyn SessionStorePort>,
    pub cue_store: Arc<dyn CueStorePort>,
    pub credential_store: Arc<dyn CredentialStorePort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Command Handlers ==========
    pub open_session_handler: OpenSessionHandler,
    pub close_session_handler: CloseSessionHandler,
    pub set_player_mode_handler: SetPlayerModeHandler,
    pub set_color_scheme_handler: SetColorSchemeHandler,
    pub set_mute_handler: SetMuteHandler,
    pub submit_turn_handler: SubmitTurnHandler,
    pub cancel_turn_handler: CancelTurnHandler,
    pub set_credential_handler: SetCredentialHandler,
    pub clear_credential_handler: ClearCredentialHandler,

    // ========== Query Handlers ==========
    pub get_session_handler: GetSessionHandler,
    pub list_sessions_handler: ListSessionsHandler,
    pub get_narration_status_handler: GetNarrationStatusHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        credential_store: Arc<dyn CredentialStorePort>,
        stream_worker: Arc<StreamWorker>,
        playback: Arc<PlaybackSynchronizer>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            // Ports
            session_store: session_store.clone(),
            cue_store: cue_store.clone(),
            credential_store: credential_store.clone(),
            event_publisher: event_publisher.clone(),

            // Command handlers
            open_session_handler: OpenSessionHandler::new(
                session_store.clone(),
                event_publisher.clone(),
                playback.clone(),
            ),
            close_session_handler: CloseSessionHandler::new(
                session_store.clone(),
                cue_store.clone(),
                event_publisher.clone(),
                playback.clone(),
            ),
            set_player_mode_handler: SetPlayerModeHandler::new(
                session_store.clone(),
                cue_store.clone(),
                event_publisher.clone(),
                playback.clone(),
            ),
            set_color_scheme_handler: SetColorSchemeHandler::new(
                session_store.clone(),
                event_publisher.clone(),
            ),
            set_mute_handler: SetMuteHandler::new(
                session_store.clone(),
                event_publisher.clone(),
            ),
            submit_turn_handler: SubmitTurnHandler::new(
                session_store.clone(),
                credential_store.clone(),
                stream_worker,
            ),
            cancel_turn_handler: CancelTurnHandler::new(
                session_store.clone(),
                cue_store.clone(),
                event_publisher.clone(),
            ),
            set_credential_handler: SetCredentialHandler::new(
                credential_store.clone(),
                event_publisher.clone(),
            ),
            clear_credential_handler: ClearCredentialHandler::new(
                credential_store.clone(),
                event_publisher.clone(),
            ),

            // Query handlers
            get_session_handler: GetSessionHandler::new(session_store.clone()),
            list_sessions_handler: ListSessionsHandler::new(session_store.clone()),
            get_narration_status_handler: GetNarrationStatusHandler::new(
                session_store.clone(),
                cue_store.clone(),
            ),
        }
    }
}
