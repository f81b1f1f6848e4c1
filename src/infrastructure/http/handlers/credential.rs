//! Credential Handlers - 进程级 API 凭据管理
//!
//! 明文只进不出：写入后所有响应与日志只出现掩码形式

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::{ClearCredentialCommand, SetCredentialCommand};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// Set Credential
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetCredentialRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SetCredentialResponseDto {
    pub masked: String,
}

pub async fn set_credential(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetCredentialRequest>,
) -> Result<Json<ApiResponse<SetCredentialResponseDto>>, ApiError> {
    let cmd = SetCredentialCommand {
        api_key: req.api_key,
    };

    let result = state.set_credential_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(SetCredentialResponseDto {
        masked: result.masked,
    })))
}

// ============================================================================
// Clear Credential
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ClearCredentialResponseDto {
    pub was_present: bool,
}

pub async fn clear_credential(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ClearCredentialResponseDto>>, ApiError> {
    let result = state
        .clear_credential_handler
        .handle(ClearCredentialCommand)
        .await?;

    Ok(Json(ApiResponse::success(ClearCredentialResponseDto {
        was_present: result.was_present,
    })))
}

// ============================================================================
// Credential Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CredentialStatusDto {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

pub async fn credential_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CredentialStatusDto>>, ApiError> {
    let credential = state.credential_store.get();

    Ok(Json(ApiResponse::success(CredentialStatusDto {
        present: credential.is_some(),
        masked: credential.map(|c| c.masked()),
    })))
}
