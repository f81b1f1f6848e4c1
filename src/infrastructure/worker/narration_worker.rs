//! Narration Worker - Synthesis Task Processor
//!
//! 从队列消费提示音并执行语音合成。合成可乱序完成；
//! 播放顺序由播放同步器按片段索引另行保证。
//! 合成前后各做一次废弃检查，取消后完成的结果直接弃置

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::ports::{
    CueState, CueStorePort, SessionStorePort, SpeechSynthesizerPort, SynthesisRequest, VoiceParams,
};
use crate::infrastructure::events::EventPublisher;

/// Narration Worker 配置
#[derive(Debug, Clone)]
pub struct NarrationWorkerConfig {
    /// 最大并发合成数
    pub max_concurrent: usize,
    /// 音色参数
    pub voice: VoiceParams,
}

impl Default for NarrationWorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            voice: VoiceParams::default(),
        }
    }
}

/// 合成 Worker
///
/// 后台任务处理器，从队列消费提示音并请求合成
pub struct NarrationWorker {
    config: NarrationWorkerConfig,
    queue_receiver: mpsc::Receiver<String>,
    cue_store: Arc<dyn CueStorePort>,
    session_store: Arc<dyn SessionStorePort>,
    synthesizer: Arc<dyn SpeechSynthesizerPort>,
    event_publisher: Arc<EventPublisher>,
}

impl NarrationWorker {
    pub fn new(
        config: NarrationWorkerConfig,
        queue_receiver: mpsc::Receiver<String>,
        cue_store: Arc<dyn CueStorePort>,
        session_store: Arc<dyn SessionStorePort>,
        synthesizer: Arc<dyn SpeechSynthesizerPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            queue_receiver,
            cue_store,
            session_store,
            synthesizer,
            event_publisher,
        }
    }

    /// 启动 Worker
    pub async fn run(mut self) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            voice = %self.config.voice.voice,
            "NarrationWorker started"
        );

        // 使用 semaphore 控制并发
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrent));

        while let Some(cue_id) = self.queue_receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Failed to acquire semaphore permit");
                    continue;
                }
            };

            let cue_store = self.cue_store.clone();
            let session_store = self.session_store.clone();
            let synthesizer = self.synthesizer.clone();
            let event_publisher = self.event_publisher.clone();
            let voice = self.config.voice.clone();

            tokio::spawn(async move {
                let _permit = permit; // 持有 permit 直到合成完成

                Self::process_cue(
                    &cue_id,
                    cue_store,
                    session_store,
                    synthesizer,
                    event_publisher,
                    voice,
                )
                .await;
            });
        }

        tracing::info!("NarrationWorker stopped");
    }

    /// 处理单个提示音
    async fn process_cue(
        cue_id: &str,
        cue_store: Arc<dyn CueStorePort>,
        session_store: Arc<dyn SessionStorePort>,
        synthesizer: Arc<dyn SpeechSynthesizerPort>,
        event_publisher: Arc<EventPublisher>,
        voice: VoiceParams,
    ) {
        let cue = match cue_store.get(cue_id) {
            Some(c) => c,
            None => {
                tracing::debug!(cue_id = %cue_id, "Cue not found, skipping");
                return;
            }
        };

        // Check 1: 提示音是否已废弃（回合取消 / 叙播关闭）
        if cue_store.is_cancelled(cue_id) {
            tracing::debug!(cue_id = %cue_id, "Cue discarded, skipping");
            return;
        }

        // Check 2: 会话是否有效
        if !session_store.is_valid(&cue.session_id) {
            tracing::debug!(
                cue_id = %cue_id,
                session_id = %cue.session_id,
                "Session invalid, skipping"
            );
            return;
        }

        // 标记为合成中；并发的废弃在这里被发现
        if let Err(e) = cue_store.set_state(cue_id, CueState::Loading) {
            tracing::debug!(cue_id = %cue_id, error = %e, "Cue no longer queued, skipping");
            return;
        }
        if let Some(loading) = cue_store.get(cue_id) {
            event_publisher.publish_cue_state(&loading);
        }

        // 执行合成
        let request = SynthesisRequest {
            text: cue.text.clone(),
            voice,
        };

        let audio = match synthesizer.synthesize(request).await {
            Ok(audio) => audio,
            Err(e) => {
                // 合成失败只影响这一段，播放时跳过
                tracing::warn!(
                    cue_id = %cue_id,
                    session_id = %cue.session_id,
                    segment_index = cue.segment_index,
                    error = %e,
                    "Synthesis failed"
                );
                if cue_store.set_errored(cue_id, e.to_string()).is_ok() {
                    if let Some(errored) = cue_store.get(cue_id) {
                        event_publisher.publish_cue_state(&errored);
                    }
                }
                return;
            }
        };

        // Check 3: 合成后再次检查，迟到的结果不得入册
        if !session_store.is_valid(&cue.session_id) {
            tracing::debug!(
                cue_id = %cue_id,
                session_id = %cue.session_id,
                "Session invalid after synthesis, dropping result"
            );
            return;
        }

        match cue_store.set_ready(cue_id, audio) {
            Ok(()) => {
                if let Some(ready) = cue_store.get(cue_id) {
                    event_publisher.publish_cue_state(&ready);
                }
                tracing::info!(
                    cue_id = %cue_id,
                    session_id = %cue.session_id,
                    turn_id = %cue.turn_id,
                    segment_index = cue.segment_index,
                    "Cue ready"
                );
            }
            Err(e) => {
                // 合成期间被废弃，结果弃置
                tracing::debug!(cue_id = %cue_id, error = %e, "Stale synthesis result dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{AudioCue, CueStorePort};
    use crate::domain::conversation::{ColorScheme, TextSegment, TurnId};
    use crate::infrastructure::adapters::FakeSpeechClient;
    use crate::infrastructure::memory::{
        InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
    };
    use tokio::time::Duration;

    struct Rig {
        session_store: Arc<InMemorySessionStore>,
        cue_store: Arc<InMemoryCueStore>,
        cue_tx: mpsc::Sender<String>,
    }

    fn build_rig(synthesizer: FakeSpeechClient) -> Rig {
        let session_store = InMemorySessionStore::new(SessionStoreConfig::default()).arc();
        let (cue_tx, cue_rx) = mpsc::channel(100);
        let cue_store = InMemoryCueStore::new(cue_tx.clone()).arc();
        let event_publisher = EventPublisher::new().arc();

        let worker = NarrationWorker::new(
            NarrationWorkerConfig::default(),
            cue_rx,
            cue_store.clone(),
            session_store.clone(),
            Arc::new(synthesizer),
            event_publisher,
        );
        tokio::spawn(worker.run());

        Rig {
            session_store,
            cue_store,
            cue_tx,
        }
    }

    fn make_cue(session_id: &str, turn_id: TurnId, index: usize, text: &str) -> AudioCue {
        let segment = TextSegment::new(index, text.to_string()).unwrap();
        AudioCue::new(session_id, turn_id, &segment)
    }

    async fn wait_for_state(rig: &Rig, cue_id: &str, expected: CueState) {
        for _ in 0..300 {
            if rig.cue_store.get(cue_id).map(|c| c.state) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cue never reached {:?}", expected);
    }

    #[tokio::test]
    async fn test_cue_synthesized_to_ready() {
        let rig = build_rig(FakeSpeechClient::new());
        let session = rig.session_store.create(true, ColorScheme::Light).unwrap();
        let turn_id = TurnId::new();

        let cue = make_cue(&session.id, turn_id, 0, "第一句。");
        let cue_id = cue.cue_id.clone();
        rig.cue_store.submit(vec![cue]).unwrap();

        wait_for_state(&rig, &cue_id, CueState::Ready).await;
        assert!(rig.cue_store.take_audio(&cue_id).is_some());
    }

    #[tokio::test]
    async fn test_synthesis_failure_marks_errored() {
        let rig = build_rig(FakeSpeechClient::new().fail_for("坏句子。"));
        let session = rig.session_store.create(true, ColorScheme::Light).unwrap();
        let turn_id = TurnId::new();

        let cue = make_cue(&session.id, turn_id, 0, "坏句子。");
        let cue_id = cue.cue_id.clone();
        rig.cue_store.submit(vec![cue]).unwrap();

        wait_for_state(&rig, &cue_id, CueState::Errored).await;
        assert!(rig.cue_store.take_audio(&cue_id).is_none());
    }

    #[tokio::test]
    async fn test_discarded_cue_skipped_before_synthesis() {
        let rig = build_rig(FakeSpeechClient::new().with_default_delay(50));
        let session = rig.session_store.create(true, ColorScheme::Light).unwrap();
        let turn_id = TurnId::new();

        let cue = make_cue(&session.id, turn_id, 0, "不该合成。");
        let cue_id = cue.cue_id.clone();
        rig.cue_store.submit(vec![cue]).unwrap();
        // 入册后立刻废弃；无论 worker 先后拿到消息，结果都不得入册
        rig.cue_store.discard_turn(&session.id, turn_id);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rig.cue_store.get(&cue_id).unwrap().state, CueState::Cancelled);
        assert!(rig.cue_store.take_audio(&cue_id).is_none());
    }

    #[tokio::test]
    async fn test_result_dropped_when_session_closed_during_synthesis() {
        let rig = build_rig(FakeSpeechClient::new().with_default_delay(60));
        let session = rig.session_store.create(true, ColorScheme::Light).unwrap();
        let turn_id = TurnId::new();

        let cue = make_cue(&session.id, turn_id, 0, "合成途中关闭。");
        let cue_id = cue.cue_id.clone();
        rig.cue_store.submit(vec![cue]).unwrap();

        wait_for_state(&rig, &cue_id, CueState::Loading).await;
        rig.session_store.close(&session.id).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        // 合成结果被弃置，提示音停留在 loading（随后的清理由会话关闭方负责）
        assert!(rig.cue_store.take_audio(&cue_id).is_none());
        assert_ne!(rig.cue_store.get(&cue_id).unwrap().state, CueState::Ready);
    }
}
