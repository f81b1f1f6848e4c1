//! Audio Output Port - 音频输出设备抽象
//!
//! 进程内唯一的播放设备，由播放同步器独占驱动；
//! 其余组件不得直接触碰播放控制

use async_trait::async_trait;
use thiserror::Error;

use super::speech::SynthesizedAudio;

/// 播放错误
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// 设备级故障（本会话叙播将被锁定）
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// 单段音频无法解码（跳过该段）
    #[error("Audio decode failed: {0}")]
    DecodeFailed(String),
}

/// 一次播放的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// 自然播完
    Completed,
    /// 被 stop 打断
    Stopped,
}

/// Audio Output Port
///
/// play 挂起直到播放结束或被打断；pause/resume/stop 可从其他任务调用
#[async_trait]
pub trait AudioOutputPort: Send + Sync {
    /// 播放一段音频
    async fn play(&self, audio: SynthesizedAudio) -> Result<PlaybackEnd, PlaybackError>;

    /// 暂停当前播放（保持位置）
    fn pause(&self);

    /// 恢复暂停的播放
    fn resume(&self);

    /// 停止当前播放，在播的 play 以 Stopped 返回
    fn stop(&self);
}
