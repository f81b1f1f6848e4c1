//! Parlor - 会话式流式叙播系统
//!
//! - Domain: conversation/ 聚合 + 流式句子切分
//! - Application: commands, queries, ports
//! - Infrastructure: http, memory, worker, adapters, events

use std::sync::Arc;

use parlor::application::ports::{ApiCredential, BusyPolicy, VoiceParams};
use parlor::config::{load_config, print_config};
use parlor::domain::SegmentConfig;
use parlor::infrastructure::adapters::{
    DeviceAudioOutput, HttpCompletionClient, HttpCompletionClientConfig, HttpSpeechClient,
    HttpSpeechClientConfig,
};
use parlor::infrastructure::events::EventPublisher;
use parlor::infrastructure::http::{AppState, HttpServer, ServerConfig};
use parlor::infrastructure::memory::{
    InMemoryCredentialStore, InMemoryCueStore, InMemorySessionStore, SessionStoreConfig,
};
use parlor::infrastructure::worker::{
    NarrationWorker, NarrationWorkerConfig, PlaybackSynchronizer, PlaybackSynchronizerConfig,
    SessionSweeper, SessionSweeperConfig, StreamWorker, StreamWorkerConfig,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},parlor={},tower_http=debug",
        config.log.level, config.log.level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Parlor - 会话式流式叙播系统");
    print_config(&config);

    // 会话存储
    let busy_policy = BusyPolicy::from_str(&config.session.busy_policy)
        .ok_or_else(|| anyhow::anyhow!("Invalid busy_policy: {}", config.session.busy_policy))?;
    let session_store = InMemorySessionStore::new(SessionStoreConfig {
        segment_config: SegmentConfig {
            min_chars: config.session.min_segment_chars,
        },
        busy_policy,
        max_history_turns: config.session.max_history_turns,
    })
    .arc();

    // 提示音存储与合成队列
    let (cue_tx, cue_rx) = mpsc::channel(config.narration.queue_capacity);
    let cue_store = InMemoryCueStore::new(cue_tx).arc();

    // 凭据存储（启动时从配置预置，运行期可覆盖）
    let seeded_credential = match &config.credential.api_key {
        Some(key) => {
            let credential = ApiCredential::new(key.clone())
                .map_err(|e| anyhow::anyhow!("Invalid preset credential: {}", e))?;
            tracing::info!(credential = %credential.masked(), "API credential preset from config");
            Some(credential)
        }
        None => None,
    };
    let credential_store = InMemoryCredentialStore::with_credential(seeded_credential).arc();

    // 事件发布器
    let event_publisher = EventPublisher::new().arc();

    // 外部服务客户端
    let completion_client = Arc::new(HttpCompletionClient::new(HttpCompletionClientConfig {
        base_url: config.completion.url.clone(),
        connect_timeout_secs: config.completion.connect_timeout_secs,
    })?);
    let speech_client = Arc::new(HttpSpeechClient::new(HttpSpeechClientConfig {
        base_url: config.speech.url.clone(),
        timeout_secs: config.speech.timeout_secs,
    })?);

    // 音频输出设备（进程内唯一）
    let audio_output = DeviceAudioOutput::new()
        .map_err(|e| anyhow::anyhow!("Failed to open audio device: {}", e))?
        .arc();

    // 流式交换驱动
    let stream_worker = StreamWorker::new(
        StreamWorkerConfig {
            model: config.completion.model.clone(),
            chunk_timeout_secs: config.completion.chunk_timeout_secs,
            system_prompt: config.completion.system_prompt.clone(),
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
        },
        session_store.clone(),
        cue_store.clone(),
        credential_store.clone(),
        completion_client,
        event_publisher.clone(),
    )
    .arc();

    // 播放同步器
    let playback = PlaybackSynchronizer::new(
        PlaybackSynchronizerConfig {
            poll_interval_ms: config.playback.poll_interval_ms,
        },
        session_store.clone(),
        cue_store.clone(),
        audio_output,
        event_publisher.clone(),
    )
    .arc();

    // 合成调度 Worker
    let narration_worker = NarrationWorker::new(
        NarrationWorkerConfig {
            max_concurrent: config.narration.max_concurrent,
            voice: VoiceParams {
                voice: config.speech.voice.clone(),
                speed: config.speech.speed,
            },
        },
        cue_rx,
        cue_store.clone(),
        session_store.clone(),
        speech_client,
        event_publisher.clone(),
    );
    tokio::spawn(narration_worker.run());

    // 闲置会话回收
    let sweeper = SessionSweeper::new(
        SessionSweeperConfig {
            enabled: config.gc.enabled,
            interval_secs: config.gc.interval_secs,
            session_expire_secs: config.gc.session_expire_secs,
        },
        session_store.clone(),
        cue_store.clone(),
        playback.clone(),
        event_publisher.clone(),
    );
    tokio::spawn(sweeper.run());

    // HTTP 服务器
    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        session_store,
        cue_store,
        credential_store,
        stream_worker,
        playback,
        event_publisher,
    ));

    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
