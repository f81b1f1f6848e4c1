//! Playback Adapters - 音频输出设备接入

mod device_output;
mod fake_output;

pub use device_output::DeviceAudioOutput;
pub use fake_output::FakeAudioOutput;
