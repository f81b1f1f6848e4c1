//! Completion Adapters - 流式补全服务接入

mod fake_completion_client;
mod http_completion_client;

pub use fake_completion_client::{FakeCompletionClient, FakeFailure, FakeStep};
pub use http_completion_client::{HttpCompletionClient, HttpCompletionClientConfig};
