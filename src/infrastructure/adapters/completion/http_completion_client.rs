//! HTTP Completion Client - 调用外部流式补全服务
//!
//! 实现 CompletionClientPort trait，通过 SSE 逐行读取文本增量
//!
//! 外部补全 API:
//! POST {base_url}/v1/chat/completions
//! Request: {"model": "...", "messages": [...], "stream": true}  (JSON)
//! Response: text/event-stream，data: 行携带 JSON 增量，data: [DONE] 收尾

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::application::ports::{
    ApiCredential, ChatMessage, CompletionClientPort, CompletionError, CompletionRequest,
    CompletionStream,
};

/// 补全请求体 (JSON)
#[derive(Debug, Serialize)]
struct CompletionHttpRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// SSE 增量块 (JSON)
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// 一行 SSE 解析出的有效载荷
#[derive(Debug, PartialEq)]
enum SseLine {
    /// 文本增量（可能为空串，调用方自行跳过）
    Delta(String),
    /// 流终止标记
    Done,
}

/// 解析一行 SSE
///
/// 空行、注释行与非 data 字段行返回 None；
/// data 行的 JSON 解析失败即为流格式损坏
fn parse_sse_line(line: &str) -> Result<Option<SseLine>, CompletionError> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(payload) = line.strip_prefix("data:") else {
        // event:/id:/retry: 等字段行，直接忽略
        return Ok(None);
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
        return Ok(Some(SseLine::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| CompletionError::MalformedStream(format!("bad delta payload: {}", e)))?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();
    Ok(Some(SseLine::Delta(content)))
}

/// HTTP 补全客户端配置
#[derive(Debug, Clone)]
pub struct HttpCompletionClientConfig {
    /// 补全服务基础 URL
    pub base_url: String,
    /// 建连超时（秒）；不设整体超时，长流由上层按增量计时
    pub connect_timeout_secs: u64,
}

impl Default for HttpCompletionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl HttpCompletionClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// HTTP 补全客户端
pub struct HttpCompletionClient {
    client: Client,
    config: HttpCompletionClientConfig,
}

impl HttpCompletionClient {
    pub fn new(config: HttpCompletionClientConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| CompletionError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn with_default_config() -> Result<Self, CompletionError> {
        Self::new(HttpCompletionClientConfig::default())
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }
}

#[async_trait]
impl CompletionClientPort for HttpCompletionClient {
    async fn open(
        &self,
        request: CompletionRequest,
        credential: &ApiCredential,
    ) -> Result<Box<dyn CompletionStream>, CompletionError> {
        let http_request = CompletionHttpRequest {
            model: request.model.clone(),
            messages: request.messages,
            stream: true,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        tracing::debug!(
            url = %self.chat_url(),
            model = %http_request.model,
            messages = http_request.messages.len(),
            "Opening completion stream"
        );

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(credential.expose())
            .json(&http_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else if e.is_connect() {
                    CompletionError::NetworkError(format!(
                        "Cannot connect to completion service: {}",
                        e
                    ))
                } else {
                    CompletionError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Unauthorized(error_text));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::ServiceError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(Box::new(HttpCompletionStream {
            response,
            buffer: Vec::new(),
            done: false,
        }))
    }

    async fn health_check(&self) -> bool {
        // 任何响应（含 401）都说明服务可达
        self.client
            .get(&self.config.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}

/// SSE 响应体上的增量流
struct HttpCompletionStream {
    response: reqwest::Response,
    /// 跨 chunk 的行缓冲（按字节累积，UTF-8 在行边界校验）
    buffer: Vec<u8>,
    done: bool,
}

impl HttpCompletionStream {
    /// 从缓冲中取出一个完整行（含换行则剥离）
    fn pop_line(&mut self) -> Option<Result<String, CompletionError>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
        Some(
            String::from_utf8(line_bytes)
                .map_err(|e| CompletionError::MalformedStream(format!("invalid utf-8: {}", e))),
        )
    }
}

#[async_trait]
impl CompletionStream for HttpCompletionStream {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        if self.done {
            return None;
        }

        loop {
            // 先消费缓冲里已经完整的行
            while let Some(line) = self.pop_line() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(e)),
                };
                match parse_sse_line(&line) {
                    Ok(Some(SseLine::Delta(text))) if !text.is_empty() => {
                        return Some(Ok(text));
                    }
                    Ok(Some(SseLine::Delta(_))) | Ok(None) => {}
                    Ok(Some(SseLine::Done)) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            // 缓冲不足一行，继续读响应体
            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => {
                    // 服务端未发 [DONE] 就关闭了流
                    self.done = true;
                    if self.buffer.iter().any(|&b| !b.is_ascii_whitespace()) {
                        return Some(Err(CompletionError::MalformedStream(
                            "stream ended mid-line".to_string(),
                        )));
                    }
                    tracing::warn!("Completion stream closed without terminator");
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    let err = if e.is_timeout() {
                        CompletionError::Timeout
                    } else {
                        CompletionError::ConnectionReset(e.to_string())
                    };
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpCompletionClientConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com");
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_config_builder() {
        let config =
            HttpCompletionClientConfig::new("http://localhost:11434").with_connect_timeout(3);
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.connect_timeout_secs, 3);
    }

    #[test]
    fn test_parse_data_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#;
        let parsed = parse_sse_line(line).unwrap();
        assert_eq!(parsed, Some(SseLine::Delta("你好".to_string())));
    }

    #[test]
    fn test_parse_done_line() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Some(SseLine::Done));
    }

    #[test]
    fn test_parse_skips_comments_and_fields() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_sse_line("event: message").unwrap(), None);
    }

    #[test]
    fn test_parse_empty_delta() {
        // finish 块里 delta 为空对象
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let parsed = parse_sse_line(line).unwrap();
        assert_eq!(parsed, Some(SseLine::Delta(String::new())));
    }

    #[test]
    fn test_parse_malformed_payload() {
        let result = parse_sse_line("data: {not json");
        assert!(matches!(result, Err(CompletionError::MalformedStream(_))));
    }

    #[test]
    fn test_parse_crlf_line() {
        let parsed = parse_sse_line("data: [DONE]\r").unwrap();
        assert_eq!(parsed, Some(SseLine::Done));
    }
}
