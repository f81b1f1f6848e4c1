//! Fake Completion Client - 用于测试的补全客户端
//!
//! 按脚本产出增量，不实际调用补全服务

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Duration;

use crate::application::ports::{
    ApiCredential, CompletionClientPort, CompletionError, CompletionRequest, CompletionStream,
};

/// 脚本步骤
#[derive(Debug, Clone)]
pub enum FakeStep {
    /// 产出一段文本增量
    Delta(String),
    /// 等待指定毫秒后继续
    Delay(u64),
    /// 以指定错误中断流
    Fail(FakeFailure),
    /// 永久挂起（用于触发上层的增量超时）
    Stall,
}

/// 脚本化的失败种类
#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Timeout,
    ConnectionReset,
    ServerError,
    MalformedStream,
}

impl FakeFailure {
    fn to_error(self) -> CompletionError {
        match self {
            FakeFailure::Timeout => CompletionError::Timeout,
            FakeFailure::ConnectionReset => {
                CompletionError::ConnectionReset("scripted reset".to_string())
            }
            FakeFailure::ServerError => CompletionError::ServiceError {
                status: 500,
                message: "scripted server error".to_string(),
            },
            FakeFailure::MalformedStream => {
                CompletionError::MalformedStream("scripted bad payload".to_string())
            }
        }
    }
}

/// Fake Completion Client
///
/// 每次 open 都回放同一份脚本；发出的请求留档供测试断言
pub struct FakeCompletionClient {
    steps: Vec<FakeStep>,
    /// 相邻增量之间的默认间隔（毫秒）
    delta_gap_ms: u64,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletionClient {
    pub fn new(steps: Vec<FakeStep>) -> Self {
        Self {
            steps,
            delta_gap_ms: 0,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 以一组文本增量建脚本
    pub fn from_deltas(deltas: &[&str]) -> Self {
        Self::new(deltas.iter().map(|d| FakeStep::Delta(d.to_string())).collect())
    }

    pub fn with_delta_gap(mut self, ms: u64) -> Self {
        self.delta_gap_ms = ms;
        self
    }

    /// 已发出的补全请求
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClientPort for FakeCompletionClient {
    async fn open(
        &self,
        request: CompletionRequest,
        _credential: &ApiCredential,
    ) -> Result<Box<dyn CompletionStream>, CompletionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Ok(Box::new(FakeCompletionStream {
            steps: self.steps.clone().into(),
            delta_gap_ms: self.delta_gap_ms,
        }))
    }
}

struct FakeCompletionStream {
    steps: VecDeque<FakeStep>,
    delta_gap_ms: u64,
}

#[async_trait]
impl CompletionStream for FakeCompletionStream {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        loop {
            match self.steps.pop_front()? {
                FakeStep::Delta(text) => {
                    if self.delta_gap_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.delta_gap_ms)).await;
                    }
                    return Some(Ok(text));
                }
                FakeStep::Delay(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                FakeStep::Fail(failure) => {
                    return Some(Err(failure.to_error()));
                }
                FakeStep::Stall => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
        }
    }
}
