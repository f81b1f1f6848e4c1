//! Controller Handlers - 用户输入手势的落点
//!
//! 路由挂在凭据闸门之后，凭据缺失时请求到不了这里

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::{CancelTurnCommand, SetMuteCommand, SubmitOutcome, SubmitTurnCommand};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// Submit Turn
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitTurnResponseDto {
    pub session_id: String,
    /// started | queued
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_turn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_turn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTurnRequest>,
) -> Result<Json<ApiResponse<SubmitTurnResponseDto>>, ApiError> {
    let cmd = SubmitTurnCommand {
        session_id: req.session_id,
        text: req.text,
    };

    let result = state.submit_turn_handler.handle(cmd).await?;

    let dto = match result.outcome {
        SubmitOutcome::Started {
            user_turn_id,
            assistant_turn_id,
            request_id,
        } => SubmitTurnResponseDto {
            session_id: result.session_id,
            outcome: "started".to_string(),
            user_turn_id: Some(user_turn_id.to_string()),
            assistant_turn_id: Some(assistant_turn_id.to_string()),
            request_id: Some(request_id),
            position: None,
        },
        SubmitOutcome::Queued { position } => SubmitTurnResponseDto {
            session_id: result.session_id,
            outcome: "queued".to_string(),
            user_turn_id: None,
            assistant_turn_id: None,
            request_id: None,
            position: Some(position),
        },
    };

    Ok(Json(ApiResponse::success(dto)))
}

// ============================================================================
// Cancel Turn
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CancelTurnRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelTurnResponseDto {
    pub session_id: String,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    pub discarded_cues: usize,
}

pub async fn cancel_turn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelTurnRequest>,
) -> Result<Json<ApiResponse<CancelTurnResponseDto>>, ApiError> {
    let cmd = CancelTurnCommand {
        session_id: req.session_id,
    };

    let result = state.cancel_turn_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(CancelTurnResponseDto {
        session_id: result.session_id,
        cancelled: result.cancelled,
        turn_id: result.turn_id.map(|id| id.to_string()),
        discarded_cues: result.discarded_cues,
    })))
}

// ============================================================================
// Mute
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetMuteRequest {
    pub session_id: String,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct SetMuteResponseDto {
    pub session_id: String,
    pub muted: bool,
    pub changed: bool,
}

pub async fn set_mute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetMuteRequest>,
) -> Result<Json<ApiResponse<SetMuteResponseDto>>, ApiError> {
    let cmd = SetMuteCommand {
        session_id: req.session_id,
        muted: req.muted,
    };

    let result = state.set_mute_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(SetMuteResponseDto {
        session_id: result.session_id,
        muted: result.muted,
        changed: result.changed,
    })))
}
