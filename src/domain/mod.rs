//! Domain Layer - 领域层
//!
//! 包含一个限界上下文:
//! - Conversation Context: 会话与回合管理
//!
//! 以及共享的流式文本分割器

pub mod conversation;

mod text_segmenter;

pub use text_segmenter::{SegmentConfig, StreamSegmenter, DEFAULT_MIN_CHARS};
