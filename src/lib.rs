//! Parlor - 会话式流式叙播系统
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Conversation Context: 会话/回合聚合与流式句子切分
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SessionStore, CueStore, CompletionClient, SpeechSynthesizer, AudioOutput, CredentialStore）
//! - Commands: CQRS 命令处理器
//! - Queries: CQRS 查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Memory: SessionStore, CueStore, CredentialStore 内存实现
//! - Worker: StreamWorker 流式交换驱动、NarrationWorker 合成调度、
//!   PlaybackSynchronizer 播放推进、SessionSweeper 闲置回收
//! - Adapters: Completion/Speech HTTP 客户端、音频输出设备
//! - Events: WebSocket 事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
