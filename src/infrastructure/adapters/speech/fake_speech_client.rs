//! Fake Speech Client - 用于测试的合成客户端
//!
//! 按文本查表决定延迟与成败，可模拟乱序完成与合成失败

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::time::Duration;

use crate::application::ports::{
    SpeechSynthesizerPort, SynthesisError, SynthesisRequest, SynthesizedAudio,
};

/// Fake Speech Client
///
/// 音频字节即文本字节，便于下游断言播放了哪个片段
pub struct FakeSpeechClient {
    /// 未指定延迟时的默认合成耗时（毫秒）
    default_delay_ms: u64,
    /// 标称音频时长（毫秒）
    duration_ms: u64,
    /// 指定文本的合成耗时，用于制造乱序完成
    delays: HashMap<String, u64>,
    /// 合成必定失败的文本
    failures: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeSpeechClient {
    pub fn new() -> Self {
        Self {
            default_delay_ms: 10,
            duration_ms: 40,
            delays: HashMap::new(),
            failures: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_delay(mut self, ms: u64) -> Self {
        self.default_delay_ms = ms;
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// 指定某段文本的合成耗时
    pub fn delay_for(mut self, text: impl Into<String>, ms: u64) -> Self {
        self.delays.insert(text.into(), ms);
        self
    }

    /// 指定某段文本合成失败
    pub fn fail_for(mut self, text: impl Into<String>) -> Self {
        self.failures.insert(text.into());
        self
    }

    /// 已收到的合成文本（按到达顺序)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for FakeSpeechClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizerPort for FakeSpeechClient {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.text.clone());
        }

        let delay = self
            .delays
            .get(&request.text)
            .copied()
            .unwrap_or(self.default_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.failures.contains(&request.text) {
            return Err(SynthesisError::ServiceError(
                "scripted synthesis failure".to_string(),
            ));
        }

        Ok(SynthesizedAudio {
            audio_data: request.text.into_bytes(),
            duration_ms: Some(self.duration_ms),
            sample_rate: Some(16000),
        })
    }
}
