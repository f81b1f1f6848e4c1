//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use crate::application::ports::BusyPolicy;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `PARLOR_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `PARLOR_SERVER__HOST=127.0.0.1`
/// - `PARLOR_SERVER__PORT=8080`
/// - `PARLOR_COMPLETION__URL=http://llm-gateway:8000`
/// - `PARLOR_CREDENTIAL__API_KEY=sk-...`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("completion.url", "https://api.openai.com")?
        .set_default("completion.connect_timeout_secs", 10)?
        .set_default("completion.chunk_timeout_secs", 30)?
        .set_default("completion.model", "gpt-4o-mini")?
        .set_default("speech.url", "http://localhost:8000")?
        .set_default("speech.timeout_secs", 60)?
        .set_default("speech.voice", "default")?
        .set_default("speech.speed", 1.0)?
        .set_default("session.busy_policy", "reject")?
        .set_default("session.min_segment_chars", 20)?
        .set_default("session.max_history_turns", 20)?
        .set_default("narration.max_concurrent", 2)?
        .set_default("narration.queue_capacity", 256)?
        .set_default("playback.poll_interval_ms", 20)?
        .set_default("gc.enabled", true)?
        .set_default("gc.interval_secs", 60)?
        .set_default("gc.session_expire_secs", 1800)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        // 搜索默认配置文件
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 前缀: PARLOR_
    // 层级分隔符: __ (双下划线)
    // 例如: PARLOR_COMPLETION__URL=http://llm-gateway:8000
    builder = builder.add_source(
        Environment::with_prefix("PARLOR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. 构建配置
    let config = builder.build()?;

    // 5. 反序列化为 AppConfig
    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    // 6. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.completion.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Completion URL cannot be empty".to_string(),
        ));
    }

    if config.speech.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Speech URL cannot be empty".to_string(),
        ));
    }

    if BusyPolicy::from_str(&config.session.busy_policy).is_none() {
        return Err(ConfigError::ValidationError(format!(
            "Unknown busy_policy: {} (expected reject or queue)",
            config.session.busy_policy
        )));
    }

    if config.session.min_segment_chars == 0 {
        return Err(ConfigError::ValidationError(
            "min_segment_chars cannot be 0".to_string(),
        ));
    }

    if config.narration.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "Narration max_concurrent cannot be 0".to_string(),
        ));
    }

    if config.narration.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "Narration queue_capacity cannot be 0".to_string(),
        ));
    }

    if config.playback.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "Playback poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.gc.enabled && config.gc.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "GC interval cannot be 0 when GC is enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Completion URL: {}", config.completion.url);
    tracing::info!("Completion Model: {}", config.completion.model);
    tracing::info!("Chunk Timeout: {}s", config.completion.chunk_timeout_secs);
    tracing::info!("Speech URL: {}", config.speech.url);
    tracing::info!("Speech Voice: {}", config.speech.voice);
    tracing::info!("Busy Policy: {}", config.session.busy_policy);
    tracing::info!("Min Segment Chars: {}", config.session.min_segment_chars);
    tracing::info!(
        "Credential Preset: {}",
        if config.credential.api_key.is_some() {
            "yes"
        } else {
            "no"
        }
    );
    tracing::info!("Narration Concurrency: {}", config.narration.max_concurrent);
    tracing::info!("GC Enabled: {}", config.gc.enabled);
    if config.gc.enabled {
        tracing::info!("GC Interval: {}s", config.gc.interval_secs);
        tracing::info!("Session Expire: {}s", config.gc.session_expire_secs);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_completion_url() {
        let mut config = AppConfig::default();
        config.completion.url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_unknown_busy_policy() {
        let mut config = AppConfig::default();
        config.session.busy_policy = "defer".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[server]
port = 9090

[session]
busy_policy = "queue"

[credential]
api_key = "sk-test-key"
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.session.busy_policy, "queue");
        assert_eq!(config.credential.api_key.as_deref(), Some("sk-test-key"));
        // 未覆盖的段落取默认值
        assert_eq!(config.completion.model, "gpt-4o-mini");
    }
}
