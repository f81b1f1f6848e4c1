//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod completion;
pub mod playback;
pub mod speech;

pub use completion::*;
pub use playback::*;
pub use speech::*;
