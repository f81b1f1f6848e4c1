//! Device Audio Output - 本机音频设备播放
//!
//! 实现 AudioOutputPort trait，经 rodio 解码并写入默认输出设备。
//! OutputStream 不可跨线程，由专用线程持有至进程结束；
//! Sink 可共享，播放控制从任意任务调用

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::application::ports::{AudioOutputPort, PlaybackEnd, PlaybackError, SynthesizedAudio};

/// 本机设备音频输出
pub struct DeviceAudioOutput {
    sink: Arc<Sink>,
    /// stop 打断与自然播完的判别标志
    stopped: AtomicBool,
}

impl DeviceAudioOutput {
    /// 打开默认输出设备
    ///
    /// 无可用设备（无声卡 / 无音频服务）时返回 DeviceUnavailable
    pub fn new() -> Result<Self, PlaybackError> {
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((_stream, handle)) => match Sink::try_new(&handle) {
                    Ok(sink) => {
                        let sink = Arc::new(sink);
                        if tx.send(Ok(sink)).is_err() {
                            return;
                        }
                        // _stream 存活期间设备才发声，线程挂起至进程结束
                        loop {
                            std::thread::park();
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(PlaybackError::DeviceUnavailable(e.to_string())));
                    }
                },
                Err(e) => {
                    let _ = tx.send(Err(PlaybackError::DeviceUnavailable(e.to_string())));
                }
            })
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        let sink = rx
            .recv()
            .map_err(|_| PlaybackError::DeviceUnavailable("audio thread exited".to_string()))??;

        tracing::info!("Audio output device opened");
        Ok(Self {
            sink,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl AudioOutputPort for DeviceAudioOutput {
    async fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackEnd, PlaybackError> {
        if audio.audio_data.is_empty() {
            return Err(PlaybackError::DecodeFailed("empty audio".to_string()));
        }

        let source = Decoder::new(Cursor::new(audio.audio_data))
            .map_err(|e| PlaybackError::DecodeFailed(e.to_string()))?;

        self.stopped.store(false, Ordering::SeqCst);
        self.sink.append(source);

        // 解码在混音线程逐步发生，这里只等队列排空
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || sink.sleep_until_end())
            .await
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        if self.stopped.load(Ordering::SeqCst) {
            Ok(PlaybackEnd::Stopped)
        } else {
            Ok(PlaybackEnd::Completed)
        }
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.play();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.sink.stop();
    }
}
