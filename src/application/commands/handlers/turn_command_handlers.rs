//! Turn Command Handlers

use std::sync::Arc;

use crate::application::commands::turn_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{CredentialStorePort, CueStorePort, SessionStorePort, SubmitDecision};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::worker::StreamWorker;

/// SubmitTurn Handler - 提交一次交流
///
/// 凭据缺失时控制器视为未挂载，拒绝提交；
/// 正忙时按会话的忙碌策略决定排队或拒绝
pub struct SubmitTurnHandler {
    session_store: Arc<dyn SessionStorePort>,
    credential_store: Arc<dyn CredentialStorePort>,
    stream_worker: Arc<StreamWorker>,
}

impl SubmitTurnHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        credential_store: Arc<dyn CredentialStorePort>,
        stream_worker: Arc<StreamWorker>,
    ) -> Self {
        Self {
            session_store,
            credential_store,
            stream_worker,
        }
    }

    pub async fn handle(
        &self,
        cmd: SubmitTurnCommand,
    ) -> Result<SubmitTurnResponse, ApplicationError> {
        if !self.credential_store.is_present() {
            return Err(ApplicationError::ControllerUnavailable);
        }

        let decision = self
            .session_store
            .submit_exchange(&cmd.session_id, &cmd.text)?;

        let outcome = match decision {
            SubmitDecision::Started(ticket) => {
                tracing::info!(
                    session_id = %cmd.session_id,
                    user_turn_id = %ticket.user_turn_id,
                    assistant_turn_id = %ticket.assistant_turn_id,
                    request_id = %ticket.request_id,
                    "Exchange started"
                );
                let started = SubmitOutcome::Started {
                    user_turn_id: ticket.user_turn_id,
                    assistant_turn_id: ticket.assistant_turn_id,
                    request_id: ticket.request_id.clone(),
                };
                self.stream_worker.launch(ticket);
                started
            }
            SubmitDecision::Queued { position } => {
                tracing::info!(
                    session_id = %cmd.session_id,
                    position = position,
                    "Exchange queued behind active turn"
                );
                SubmitOutcome::Queued { position }
            }
            SubmitDecision::Busy => {
                return Err(ApplicationError::TurnInFlight(cmd.session_id));
            }
        };

        Ok(SubmitTurnResponse {
            session_id: cmd.session_id,
            outcome,
        })
    }
}

/// CancelTurn Handler - 取消进行中的回合
///
/// 无在途回合时为空操作，不报错；
/// 已落地的增量与片段保留，未完结提示音全部废弃
pub struct CancelTurnHandler {
    session_store: Arc<dyn SessionStorePort>,
    cue_store: Arc<dyn CueStorePort>,
    event_publisher: Arc<EventPublisher>,
}

impl CancelTurnHandler {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        cue_store: Arc<dyn CueStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            session_store,
            cue_store,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelTurnCommand,
    ) -> Result<CancelTurnResponse, ApplicationError> {
        let outcome = self.session_store.cancel_active_turn(&cmd.session_id)?;

        let Some(outcome) = outcome else {
            tracing::debug!(session_id = %cmd.session_id, "Cancel ignored, no active turn");
            return Ok(CancelTurnResponse {
                session_id: cmd.session_id,
                cancelled: false,
                turn_id: None,
                discarded_cues: 0,
            });
        };

        let discarded_cues = self
            .cue_store
            .discard_turn(&cmd.session_id, outcome.turn_id);

        self.event_publisher
            .publish_turn_cancelled(&cmd.session_id, outcome.turn_id);
        if discarded_cues > 0 {
            self.event_publisher.publish_cues_discarded(
                &cmd.session_id,
                Some(outcome.turn_id),
                discarded_cues,
            );
        }

        tracing::info!(
            session_id = %cmd.session_id,
            turn_id = %outcome.turn_id,
            request_id = %outcome.request_id,
            discarded_cues = discarded_cues,
            "Turn cancelled by user"
        );

        Ok(CancelTurnResponse {
            session_id: cmd.session_id,
            cancelled: true,
            turn_id: Some(outcome.turn_id),
            discarded_cues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ApiCredential;
    use crate::domain::conversation::ColorScheme;
    use crate::infrastructure::adapters::{FakeCompletionClient, FakeStep};
    use crate::infrastructure::memory::{
        InMemoryCredentialStore, InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
    };
    use crate::infrastructure::worker::StreamWorkerConfig;
    use tokio::sync::mpsc;

    struct Rig {
        handler: SubmitTurnHandler,
        session_store: Arc<InMemorySessionStore>,
        _cue_rx: mpsc::Receiver<String>,
    }

    fn build_rig(with_credential: bool) -> Rig {
        let session_store = InMemorySessionStore::new(SessionStoreConfig::default()).arc();
        let (cue_tx, cue_rx) = mpsc::channel(100);
        let cue_store = InMemoryCueStore::new(cue_tx).arc();
        let credential_store = InMemoryCredentialStore::new().arc();
        if with_credential {
            credential_store.set(ApiCredential::new("sk-test-credential".to_string()).unwrap());
        }
        let completion_client = Arc::new(FakeCompletionClient::new(vec![FakeStep::Stall]));
        let event_publisher = EventPublisher::new().arc();

        let stream_worker = StreamWorker::new(
            StreamWorkerConfig::default(),
            session_store.clone(),
            cue_store,
            credential_store.clone(),
            completion_client,
            event_publisher,
        )
        .arc();

        Rig {
            handler: SubmitTurnHandler::new(session_store.clone(), credential_store, stream_worker),
            session_store,
            _cue_rx: cue_rx,
        }
    }

    #[tokio::test]
    async fn test_submit_response_matches_active_request() {
        let rig = build_rig(true);
        let session = rig.session_store.create(false, ColorScheme::Light).unwrap();

        let response = rig
            .handler
            .handle(SubmitTurnCommand {
                session_id: session.id.clone(),
                text: "你好".to_string(),
            })
            .await
            .unwrap();

        let (assistant_turn_id, request_id) = match response.outcome {
            SubmitOutcome::Started {
                assistant_turn_id,
                request_id,
                ..
            } => (assistant_turn_id, request_id),
            other => panic!("expected Started, got {:?}", other),
        };

        // 响应中的 request_id 与会话里登记的在途请求一致
        let snapshot = rig.session_store.get(&session.id).unwrap();
        let handle = snapshot.active_request.expect("active request");
        assert_eq!(handle.request_id, request_id);
        assert_eq!(handle.turn_id, assistant_turn_id);
    }

    #[tokio::test]
    async fn test_submit_rejected_without_credential() {
        let rig = build_rig(false);
        let session = rig.session_store.create(false, ColorScheme::Light).unwrap();

        let result = rig
            .handler
            .handle(SubmitTurnCommand {
                session_id: session.id.clone(),
                text: "你好".to_string(),
            })
            .await;

        assert!(matches!(
            result,
            Err(ApplicationError::ControllerUnavailable)
        ));
        // 控制器未挂载时不得落下任何回合
        let snapshot = rig.session_store.get(&session.id).unwrap();
        assert_eq!(snapshot.conversation.turn_count(), 0);
    }
}
