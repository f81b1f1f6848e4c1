//! In-Memory Cue Store Implementation
//!
//! 提示音按 (会话, 回合, 片段索引) 入册并推入合成队列。
//! 音频字节与提示音记录分开存放，播放时一次性取走；
//! 状态迁移经由合法性表校验，废弃后的合成结果在 set_ready 处被拒

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::ports::{
    AudioCue, CueError, CueState, CueStorePort, SynthesizedAudio,
};
use crate::domain::conversation::TurnId;

/// 内存提示音存储
pub struct InMemoryCueStore {
    /// cue_id -> AudioCue
    cues: DashMap<String, AudioCue>,
    /// cue_id -> 合成完成的音频字节
    audio: DashMap<String, SynthesizedAudio>,
    /// (session_id, turn_id, segment_index) -> cue_id
    positions: DashMap<(String, TurnId, usize), String>,
    /// session_id -> 入册顺序的 cue_id 列表
    session_cues: DashMap<String, Vec<String>>,
    /// 合成队列发送端
    queue_sender: mpsc::Sender<String>,
}

impl InMemoryCueStore {
    pub fn new(queue_sender: mpsc::Sender<String>) -> Self {
        Self {
            cues: DashMap::new(),
            audio: DashMap::new(),
            positions: DashMap::new(),
            session_cues: DashMap::new(),
            queue_sender,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 状态迁移合法性表
    fn transition_allowed(from: CueState, to: CueState) -> bool {
        matches!(
            (from, to),
            (CueState::Queued, CueState::Loading)
                | (CueState::Queued, CueState::Cancelled)
                | (CueState::Loading, CueState::Ready)
                | (CueState::Loading, CueState::Errored)
                | (CueState::Loading, CueState::Cancelled)
                | (CueState::Ready, CueState::Playing)
                | (CueState::Ready, CueState::Cancelled)
                | (CueState::Playing, CueState::Done)
                | (CueState::Playing, CueState::Errored)
                | (CueState::Playing, CueState::Cancelled)
        )
    }

    /// 废弃一批提示音中所有未完结的，返回废弃数量
    fn discard_cues(&self, cue_ids: &[String]) -> usize {
        let mut discarded = 0;
        for cue_id in cue_ids {
            if let Some(mut cue) = self.cues.get_mut(cue_id) {
                if !cue.state.is_terminal() {
                    cue.state = CueState::Cancelled;
                    cue.settled_at = Some(Utc::now());
                    self.audio.remove(cue_id);
                    discarded += 1;
                }
            }
        }
        discarded
    }
}

impl CueStorePort for InMemoryCueStore {
    fn submit(&self, cues: Vec<AudioCue>) -> Result<Vec<String>, CueError> {
        let mut cue_ids = Vec::with_capacity(cues.len());

        for cue in cues {
            let cue_id = cue.cue_id.clone();
            let session_id = cue.session_id.clone();

            self.positions.insert(
                (session_id.clone(), cue.turn_id, cue.segment_index),
                cue_id.clone(),
            );
            self.cues.insert(cue_id.clone(), cue);
            self.session_cues
                .entry(session_id)
                .or_insert_with(Vec::new)
                .push(cue_id.clone());

            // 推入合成队列
            if let Err(e) = self.queue_sender.try_send(cue_id.clone()) {
                tracing::warn!(cue_id = %cue_id, error = %e, "Failed to enqueue cue");
            }

            cue_ids.push(cue_id);
        }

        tracing::debug!(count = cue_ids.len(), "Cues submitted");
        Ok(cue_ids)
    }

    fn get(&self, cue_id: &str) -> Option<AudioCue> {
        self.cues.get(cue_id).map(|c| c.clone())
    }

    fn get_by_position(
        &self,
        session_id: &str,
        turn_id: TurnId,
        segment_index: usize,
    ) -> Option<AudioCue> {
        let key = (session_id.to_string(), turn_id, segment_index);
        let cue_id = self.positions.get(&key)?;
        self.cues.get(cue_id.value()).map(|c| c.clone())
    }

    fn cues_for_turn(&self, session_id: &str, turn_id: TurnId) -> Vec<AudioCue> {
        let mut cues: Vec<AudioCue> = self
            .session_cues
            .get(session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.cues.get(id).map(|c| c.clone()))
                    .filter(|c| c.turn_id == turn_id)
                    .collect()
            })
            .unwrap_or_default();
        cues.sort_by_key(|c| c.segment_index);
        cues
    }

    fn cues_for_session(&self, session_id: &str) -> Vec<AudioCue> {
        self.session_cues
            .get(session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.cues.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_state(&self, cue_id: &str, state: CueState) -> Result<(), CueError> {
        let mut cue = self
            .cues
            .get_mut(cue_id)
            .ok_or_else(|| CueError::NotFound(cue_id.to_string()))?;

        let old_state = cue.state;
        if !Self::transition_allowed(old_state, state) {
            return Err(CueError::InvalidStateTransition(format!(
                "{} -> {}",
                old_state.as_str(),
                state.as_str()
            )));
        }

        cue.state = state;
        if state.is_terminal() {
            cue.settled_at = Some(Utc::now());
        }

        tracing::debug!(
            cue_id = %cue_id,
            old_state = ?old_state,
            new_state = ?state,
            "Cue state changed"
        );
        Ok(())
    }

    fn set_ready(&self, cue_id: &str, audio: SynthesizedAudio) -> Result<(), CueError> {
        let mut cue = self
            .cues
            .get_mut(cue_id)
            .ok_or_else(|| CueError::NotFound(cue_id.to_string()))?;

        // 废弃后完成的合成在此被拒，结果弃置
        if cue.state != CueState::Loading {
            return Err(CueError::InvalidStateTransition(format!(
                "{} -> ready",
                cue.state.as_str()
            )));
        }

        cue.state = CueState::Ready;
        self.audio.insert(cue_id.to_string(), audio);
        Ok(())
    }

    fn set_errored(&self, cue_id: &str, error: String) -> Result<(), CueError> {
        let mut cue = self
            .cues
            .get_mut(cue_id)
            .ok_or_else(|| CueError::NotFound(cue_id.to_string()))?;

        if !Self::transition_allowed(cue.state, CueState::Errored) {
            return Err(CueError::InvalidStateTransition(format!(
                "{} -> errored",
                cue.state.as_str()
            )));
        }

        cue.state = CueState::Errored;
        cue.error_message = Some(error);
        cue.settled_at = Some(Utc::now());
        self.audio.remove(cue_id);
        Ok(())
    }

    fn take_audio(&self, cue_id: &str) -> Option<SynthesizedAudio> {
        self.audio.remove(cue_id).map(|(_, audio)| audio)
    }

    fn is_cancelled(&self, cue_id: &str) -> bool {
        self.cues
            .get(cue_id)
            .map(|c| c.state == CueState::Cancelled)
            .unwrap_or(true) // 不存在的提示音视为已废弃
    }

    fn discard_turn(&self, session_id: &str, turn_id: TurnId) -> usize {
        let cue_ids: Vec<String> = self
            .session_cues
            .get(session_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        self.cues
                            .get(id.as_str())
                            .map(|c| c.turn_id == turn_id)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let discarded = self.discard_cues(&cue_ids);
        tracing::debug!(
            session_id = %session_id,
            turn_id = %turn_id,
            discarded = discarded,
            "Turn cues discarded"
        );
        discarded
    }

    fn discard_session(&self, session_id: &str) -> usize {
        let cue_ids: Vec<String> = self
            .session_cues
            .get(session_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let discarded = self.discard_cues(&cue_ids);
        tracing::debug!(
            session_id = %session_id,
            discarded = discarded,
            "Session cues discarded"
        );
        discarded
    }

    fn cleanup_session(&self, session_id: &str) {
        if let Some((_, cue_ids)) = self.session_cues.remove(session_id) {
            for cue_id in cue_ids {
                if let Some((_, cue)) = self.cues.remove(&cue_id) {
                    self.positions
                        .remove(&(cue.session_id, cue.turn_id, cue.segment_index));
                }
                self.audio.remove(&cue_id);
            }
            tracing::debug!(session_id = %session_id, "Session cues cleaned up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::TextSegment;

    fn make_cue(session_id: &str, turn_id: TurnId, index: usize) -> AudioCue {
        let segment = TextSegment::new(index, format!("句子{}。", index)).unwrap();
        AudioCue::new(session_id, turn_id, &segment)
    }

    fn make_audio() -> SynthesizedAudio {
        SynthesizedAudio {
            audio_data: vec![1, 2, 3, 4],
            duration_ms: Some(120),
            sample_rate: Some(16000),
        }
    }

    #[tokio::test]
    async fn test_cue_lifecycle() {
        let (tx, mut rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        let turn_id = TurnId::new();

        let cue = make_cue("session-1", turn_id, 0);
        let cue_id = cue.cue_id.clone();
        store.submit(vec![cue]).unwrap();

        // 入册即入队
        assert_eq!(rx.try_recv().unwrap(), cue_id);
        assert!(store.get_by_position("session-1", turn_id, 0).is_some());

        store.set_state(&cue_id, CueState::Loading).unwrap();
        store.set_ready(&cue_id, make_audio()).unwrap();
        assert_eq!(store.get(&cue_id).unwrap().state, CueState::Ready);

        // 音频一次性取走
        assert!(store.take_audio(&cue_id).is_some());
        assert!(store.take_audio(&cue_id).is_none());

        store.set_state(&cue_id, CueState::Playing).unwrap();
        store.set_state(&cue_id, CueState::Done).unwrap();
        assert!(store.get(&cue_id).unwrap().settled_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_synthesis_rejected_after_discard() {
        let (tx, _rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        let turn_id = TurnId::new();

        let cue = make_cue("session-1", turn_id, 0);
        let cue_id = cue.cue_id.clone();
        store.submit(vec![cue]).unwrap();
        store.set_state(&cue_id, CueState::Loading).unwrap();

        // 合成尚在途中，提示音被废弃
        let discarded = store.discard_turn("session-1", turn_id);
        assert_eq!(discarded, 1);
        assert!(store.is_cancelled(&cue_id));

        // 迟到的合成结果被拒，不得复活提示音
        let result = store.set_ready(&cue_id, make_audio());
        assert!(result.is_err());
        assert_eq!(store.get(&cue_id).unwrap().state, CueState::Cancelled);
        assert!(store.take_audio(&cue_id).is_none());
    }

    #[tokio::test]
    async fn test_discard_skips_settled_cues() {
        let (tx, _rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        let turn_id = TurnId::new();

        let cues: Vec<AudioCue> = (0..3).map(|i| make_cue("session-1", turn_id, i)).collect();
        let ids: Vec<String> = cues.iter().map(|c| c.cue_id.clone()).collect();
        store.submit(cues).unwrap();

        // 第一条走完整个生命周期
        store.set_state(&ids[0], CueState::Loading).unwrap();
        store.set_ready(&ids[0], make_audio()).unwrap();
        store.set_state(&ids[0], CueState::Playing).unwrap();
        store.set_state(&ids[0], CueState::Done).unwrap();
        // 第二条正在合成
        store.set_state(&ids[1], CueState::Loading).unwrap();

        let discarded = store.discard_session("session-1");
        assert_eq!(discarded, 2);
        assert_eq!(store.get(&ids[0]).unwrap().state, CueState::Done);
        assert_eq!(store.get(&ids[1]).unwrap().state, CueState::Cancelled);
        assert_eq!(store.get(&ids[2]).unwrap().state, CueState::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let (tx, _rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        let turn_id = TurnId::new();

        let cue = make_cue("session-1", turn_id, 0);
        let cue_id = cue.cue_id.clone();
        store.submit(vec![cue]).unwrap();

        let result = store.set_state(&cue_id, CueState::Done);
        assert!(matches!(result, Err(CueError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_missing_cue_treated_as_cancelled() {
        let (tx, _rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        assert!(store.is_cancelled("does-not-exist"));
    }

    #[tokio::test]
    async fn test_cues_for_turn_sorted_by_index() {
        let (tx, _rx) = mpsc::channel(100);
        let store = InMemoryCueStore::new(tx);
        let turn_id = TurnId::new();

        for index in [2usize, 0, 1] {
            store.submit(vec![make_cue("session-1", turn_id, index)]).unwrap();
        }

        let cues = store.cues_for_turn("session-1", turn_id);
        let indices: Vec<usize> = cues.iter().map(|c| c.segment_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
