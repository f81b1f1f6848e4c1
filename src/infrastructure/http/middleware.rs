//! HTTP Middleware
//!
//! HTTP 状态码错误日志中间件 + 控制器凭据闸门

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;

/// HTTP 状态码错误日志中间件
///
/// 拦截 HTTP 响应，当状态码为 4xx 或 5xx 时记录日志
/// 注意：业务错误（errno != 0）在 ApiError::into_response() 中记录
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            "HTTP client error"
        );
    }

    response
}

/// 控制器凭据闸门
///
/// 凭据缺失时控制器视为未挂载，控制器路由一律拒绝。
/// 会话/查询路由不经过此闸门，凭据缺失时仍可浏览历史
pub async fn credential_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.credential_store.is_present() {
        return ApiError::Unauthorized("No API credential configured".to_string())
            .into_response();
    }
    next.run(request).await
}
