//! Background Workers
//!
//! 后台任务: 流式交换驱动、语音合成调度、播放推进、闲置会话回收

mod narration_worker;
mod playback_worker;
mod session_sweeper;
mod stream_worker;

pub use narration_worker::{NarrationWorker, NarrationWorkerConfig};
pub use playback_worker::{PlaybackSynchronizer, PlaybackSynchronizerConfig};
pub use session_sweeper::{SessionSweeper, SessionSweeperConfig};
pub use stream_worker::{StreamWorker, StreamWorkerConfig};
