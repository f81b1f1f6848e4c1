//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 流式补全服务配置
    #[serde(default)]
    pub completion: CompletionConfig,

    /// 语音合成服务配置
    #[serde(default)]
    pub speech: SpeechConfig,

    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,

    /// API 凭据配置
    #[serde(default)]
    pub credential: CredentialConfig,

    /// 叙播合成调度配置
    #[serde(default)]
    pub narration: NarrationConfig,

    /// 播放推进配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 闲置会话回收配置
    #[serde(default)]
    pub gc: GcConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 流式补全服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    /// 补全服务基础 URL
    #[serde(default = "default_completion_url")]
    pub url: String,

    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// 单个增量块的超时（秒），超时即判回合失败
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,

    /// 模型名
    #[serde(default = "default_model")]
    pub model: String,

    /// 系统提示词（会话上下文的首条消息）
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// 单次回复的最大 token 数
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// 采样温度
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_completion_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_chunk_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: default_completion_url(),
            connect_timeout_secs: default_connect_timeout(),
            chunk_timeout_secs: default_chunk_timeout(),
            model: default_model(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// 语音合成服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// 合成服务基础 URL
    #[serde(default = "default_speech_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,

    /// 音色
    #[serde(default = "default_voice")]
    pub voice: String,

    /// 语速倍率
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speech_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_speech_timeout() -> u64 {
    60
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_speed() -> f32 {
    1.0
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            url: default_speech_url(),
            timeout_secs: default_speech_timeout(),
            voice: default_voice(),
            speed: default_speed(),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 在途回合存在时的提交策略: reject | queue
    #[serde(default = "default_busy_policy")]
    pub busy_policy: String,

    /// 句子片段的最小字符数（短句向后合并）
    #[serde(default = "default_min_segment_chars")]
    pub min_segment_chars: usize,

    /// 上下文快照最多携带的历史回合数（0 为不限制）
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

fn default_busy_policy() -> String {
    "reject".to_string()
}

fn default_min_segment_chars() -> usize {
    crate::domain::DEFAULT_MIN_CHARS
}

fn default_max_history_turns() -> usize {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            busy_policy: default_busy_policy(),
            min_segment_chars: default_min_segment_chars(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

/// API 凭据配置
///
/// 启动时预置的补全服务凭据；运行期可经接口覆盖或清除
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialConfig {
    /// API Key（日志与接口中只出现掩码形式）
    #[serde(default)]
    pub api_key: Option<String>,
}

/// 叙播合成调度配置
#[derive(Debug, Clone, Deserialize)]
pub struct NarrationConfig {
    /// 最大并发合成数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 合成队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 播放推进配置
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// 等待/重扫的轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    20
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// GC（闲置会话回收）配置
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// 是否启用自动回收
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,

    /// 扫描间隔（秒）
    #[serde(default = "default_gc_interval")]
    pub interval_secs: u64,

    /// Session 闲置过期时间（秒）
    #[serde(default = "default_session_expire")]
    pub session_expire_secs: u64,
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_interval() -> u64 {
    60
}

fn default_session_expire() -> u64 {
    1800 // 30 分钟
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            interval_secs: default_gc_interval(),
            session_expire_secs: default_session_expire(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
