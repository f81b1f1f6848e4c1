//! HTTP Routes
//!
//! API 路由定义
//!
//! API Endpoints:
//! - /api/ping                  GET   健康检查
//! - /api/credential/set        POST  写入 API 凭据
//! - /api/credential/clear      POST  清除 API 凭据
//! - /api/credential/status     GET   凭据状态（掩码）
//! - /api/session/open          POST  打开会话
//! - /api/session/close         POST  关闭会话
//! - /api/session/get           POST  会话详情（回合与片段）
//! - /api/session/list          GET   列出所有会话
//! - /api/session/player_mode   POST  叙播开关
//! - /api/session/color_scheme  POST  配色切换
//! - /api/session/narration     POST  叙播进度查询
//! - /api/controller/submit     POST  提交用户输入（凭据闸门）
//! - /api/controller/cancel     POST  取消在途回合（凭据闸门）
//! - /api/controller/mute       POST  静音开关（凭据闸门）
//! - /ws/session/{id}           WS    Session WebSocket（回合/提示音/播放事件）
//! - /ws/events                 WS    全局 WebSocket（会话/凭据事件）

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::middleware::credential_gate;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes(state))
        .route("/ws/session/:session_id", get(handlers::websocket_handler))
        .route("/ws/events", get(handlers::global_websocket_handler))
}

/// API 路由
fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/credential", credential_routes())
        .nest("/session", session_routes())
        .nest("/controller", controller_routes(state))
}

/// Credential 路由
fn credential_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/set", post(handlers::set_credential))
        .route("/clear", post(handlers::clear_credential))
        .route("/status", get(handlers::credential_status))
}

/// Session 路由
fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/open", post(handlers::open_session))
        .route("/close", post(handlers::close_session))
        .route("/get", post(handlers::get_session))
        .route("/list", get(handlers::list_sessions))
        .route("/player_mode", post(handlers::set_player_mode))
        .route("/color_scheme", post(handlers::set_color_scheme))
        .route("/narration", post(handlers::get_narration_status))
}

/// Controller 路由（凭据闸门保护）
fn controller_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit", post(handlers::submit_turn))
        .route("/cancel", post(handlers::cancel_turn))
        .route("/mute", post(handlers::set_mute))
        .route_layer(middleware::from_fn_with_state(state, credential_gate))
}
