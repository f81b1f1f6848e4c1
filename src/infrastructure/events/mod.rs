//! Events Layer - WebSocket Event Broadcasting
//!
//! 实现 EventPublisher，向已连接的 App Shell 推送状态事件

mod publisher;

pub use publisher::{EventPublisher, WsEvent};
