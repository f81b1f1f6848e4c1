//! Fake Audio Output - 用于测试的音频输出
//!
//! 不触碰真实设备，按标称时长虚拟走带；可脚本化设备故障与解码失败

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Duration;

use crate::application::ports::{AudioOutputPort, PlaybackEnd, PlaybackError, SynthesizedAudio};

const TICK_MS: u64 = 5;

/// Fake Audio Output
///
/// 播放过的音频字节留档；配合 FakeSpeechClient（音频字节即文本）
/// 可直接断言播放顺序
pub struct FakeAudioOutput {
    /// 音频未带时长时的虚拟播放时长（毫秒）
    default_duration_ms: u64,
    /// 第 N 次 play 调用返回设备故障（0 起算）
    fail_device_on_call: Option<usize>,
    /// 解码必定失败的音频字节
    decode_failures: HashSet<Vec<u8>>,
    paused: AtomicBool,
    stopped: AtomicBool,
    call_count: AtomicUsize,
    played: Mutex<Vec<Vec<u8>>>,
}

impl FakeAudioOutput {
    pub fn new() -> Self {
        Self {
            default_duration_ms: 30,
            fail_device_on_call: None,
            decode_failures: HashSet::new(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            call_count: AtomicUsize::new(0),
            played: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_duration(mut self, ms: u64) -> Self {
        self.default_duration_ms = ms;
        self
    }

    /// 指定第 N 次 play 返回设备故障
    pub fn fail_device_on_call(mut self, call: usize) -> Self {
        self.fail_device_on_call = Some(call);
        self
    }

    /// 指定某段文本的音频解码失败
    pub fn fail_decode_for(mut self, text: &str) -> Self {
        self.decode_failures.insert(text.as_bytes().to_vec());
        self
    }

    /// 已播放（或试图播放）的音频，按 UTF-8 还原为文本
    pub fn played_texts(&self) -> Vec<String> {
        self.played
            .lock()
            .map(|p| {
                p.iter()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Default for FakeAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutputPort for FakeAudioOutput {
    async fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackEnd, PlaybackError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_device_on_call == Some(call) {
            return Err(PlaybackError::DeviceUnavailable(
                "scripted device failure".to_string(),
            ));
        }
        if self.decode_failures.contains(&audio.audio_data) {
            return Err(PlaybackError::DecodeFailed(
                "scripted decode failure".to_string(),
            ));
        }

        if let Ok(mut played) = self.played.lock() {
            played.push(audio.audio_data.clone());
        }

        self.stopped.store(false, Ordering::SeqCst);
        let mut remaining = audio.duration_ms.unwrap_or(self.default_duration_ms);
        loop {
            if self.stopped.swap(false, Ordering::SeqCst) {
                return Ok(PlaybackEnd::Stopped);
            }
            if remaining == 0 {
                return Ok(PlaybackEnd::Completed);
            }
            // 暂停期间不走带
            if !self.paused.load(Ordering::SeqCst) {
                remaining = remaining.saturating_sub(TICK_MS);
            }
            tokio::time::sleep(Duration::from_millis(TICK_MS)).await;
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(text: &str, duration_ms: u64) -> SynthesizedAudio {
        SynthesizedAudio {
            audio_data: text.as_bytes().to_vec(),
            duration_ms: Some(duration_ms),
            sample_rate: Some(16000),
        }
    }

    #[tokio::test]
    async fn test_play_completes() {
        let output = FakeAudioOutput::new();
        let end = output.play(audio("第一句。", 20)).await.unwrap();
        assert_eq!(end, PlaybackEnd::Completed);
        assert_eq!(output.played_texts(), vec!["第一句。"]);
    }

    #[tokio::test]
    async fn test_stop_interrupts_play() {
        let output = std::sync::Arc::new(FakeAudioOutput::new());
        let handle = {
            let output = output.clone();
            tokio::spawn(async move { output.play(audio("很长的一句。", 5000)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        output.stop();

        let end = handle.await.unwrap().unwrap();
        assert_eq!(end, PlaybackEnd::Stopped);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let output = FakeAudioOutput::new()
            .fail_decode_for("坏片段。")
            .fail_device_on_call(1);

        let err = output.play(audio("坏片段。", 10)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::DecodeFailed(_)));

        let err = output.play(audio("任意。", 10)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::DeviceUnavailable(_)));
    }
}
