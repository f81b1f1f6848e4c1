//! Session Handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{
    CloseSessionCommand, CueView, GetNarrationStatusQuery, GetSessionQuery, ListSessionsQuery,
    OpenSessionCommand, SessionSummary, SessionView, SetColorSchemeCommand, SetPlayerModeCommand,
    TurnView,
};
use crate::domain::conversation::{ColorScheme, TurnId};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

fn parse_color_scheme(s: &str) -> Result<ColorScheme, ApiError> {
    ColorScheme::from_str(s)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown color scheme: {}", s)))
}

fn parse_turn_id(s: &str) -> Result<TurnId, ApiError> {
    Uuid::parse_str(s)
        .map(TurnId::from_uuid)
        .map_err(|_| ApiError::BadRequest(format!("Invalid turn id: {}", s)))
}

// ============================================================================
// Open Session
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub player_mode: bool,
    #[serde(default = "default_color_scheme")]
    pub color_scheme: String,
}

fn default_color_scheme() -> String {
    "light".to_string()
}

#[derive(Debug, Serialize)]
pub struct OpenSessionResponseDto {
    pub session_id: String,
    pub player_mode: bool,
    pub color_scheme: String,
}

pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<ApiResponse<OpenSessionResponseDto>>, ApiError> {
    let cmd = OpenSessionCommand {
        player_mode: req.player_mode,
        color_scheme: parse_color_scheme(&req.color_scheme)?,
    };

    let result = state.open_session_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(OpenSessionResponseDto {
        session_id: result.session_id,
        player_mode: result.player_mode,
        color_scheme: result.color_scheme.as_str().to_string(),
    })))
}

// ============================================================================
// Close Session
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CloseSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponseDto {
    pub session_id: String,
    pub cancelled_turn: bool,
    pub discarded_cues: usize,
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CloseSessionRequest>,
) -> Result<Json<ApiResponse<CloseSessionResponseDto>>, ApiError> {
    let cmd = CloseSessionCommand {
        session_id: req.session_id,
    };

    let result = state.close_session_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(CloseSessionResponseDto {
        session_id: result.session_id,
        cancelled_turn: result.cancelled_turn,
        discarded_cues: result.discarded_cues,
    })))
}

// ============================================================================
// Get Session
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GetSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SegmentDto {
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TurnDto {
    pub id: String,
    pub role: String,
    pub status: String,
    pub content: String,
    pub pending_tail: String,
    pub segments: Vec<SegmentDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub created_at: String,
}

impl From<TurnView> for TurnDto {
    fn from(view: TurnView) -> Self {
        Self {
            id: view.id,
            role: view.role,
            status: view.status,
            content: view.content,
            pending_tail: view.pending_tail,
            segments: view
                .segments
                .into_iter()
                .map(|s| SegmentDto {
                    index: s.index,
                    content: s.content,
                })
                .collect(),
            failure_kind: view.failure_kind,
            failure_message: view.failure_message,
            created_at: view.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub session_id: String,
    pub player_mode: bool,
    pub player_locked: bool,
    pub muted: bool,
    pub color_scheme: String,
    pub busy: bool,
    pub queued_inputs: usize,
    pub turns: Vec<TurnDto>,
    pub created_at: String,
    pub last_activity: String,
}

impl From<SessionView> for SessionDto {
    fn from(view: SessionView) -> Self {
        Self {
            session_id: view.session_id,
            player_mode: view.player_mode,
            player_locked: view.player_locked,
            muted: view.muted,
            color_scheme: view.color_scheme,
            busy: view.busy,
            queued_inputs: view.queued_inputs,
            turns: view.turns.into_iter().map(TurnDto::from).collect(),
            created_at: view.created_at,
            last_activity: view.last_activity,
        }
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetSessionRequest>,
) -> Result<Json<ApiResponse<SessionDto>>, ApiError> {
    let query = GetSessionQuery {
        session_id: req.session_id,
    };

    let view = state.get_session_handler.handle(query).await?;

    Ok(Json(ApiResponse::success(SessionDto::from(view))))
}

// ============================================================================
// List Sessions
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionSummaryDto {
    pub session_id: String,
    pub turn_count: usize,
    pub player_mode: bool,
    pub busy: bool,
    pub created_at: String,
    pub last_activity: String,
}

impl From<SessionSummary> for SessionSummaryDto {
    fn from(summary: SessionSummary) -> Self {
        Self {
            session_id: summary.session_id,
            turn_count: summary.turn_count,
            player_mode: summary.player_mode,
            busy: summary.busy,
            created_at: summary.created_at,
            last_activity: summary.last_activity,
        }
    }
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SessionSummaryDto>>>, ApiError> {
    let summaries = state.list_sessions_handler.handle(ListSessionsQuery).await?;

    Ok(Json(ApiResponse::success(
        summaries.into_iter().map(SessionSummaryDto::from).collect(),
    )))
}

// ============================================================================
// Player Mode
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetPlayerModeRequest {
    pub session_id: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SetPlayerModeResponseDto {
    pub session_id: String,
    pub enabled: bool,
    pub changed: bool,
    pub discarded_cues: usize,
    pub backfilled_cues: usize,
}

pub async fn set_player_mode(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetPlayerModeRequest>,
) -> Result<Json<ApiResponse<SetPlayerModeResponseDto>>, ApiError> {
    let cmd = SetPlayerModeCommand {
        session_id: req.session_id,
        enabled: req.enabled,
    };

    let result = state.set_player_mode_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(SetPlayerModeResponseDto {
        session_id: result.session_id,
        enabled: result.enabled,
        changed: result.changed,
        discarded_cues: result.discarded_cues,
        backfilled_cues: result.backfilled_cues,
    })))
}

// ============================================================================
// Color Scheme
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetColorSchemeRequest {
    pub session_id: String,
    pub scheme: String,
}

#[derive(Debug, Serialize)]
pub struct SetColorSchemeResponseDto {
    pub session_id: String,
    pub scheme: String,
}

pub async fn set_color_scheme(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetColorSchemeRequest>,
) -> Result<Json<ApiResponse<SetColorSchemeResponseDto>>, ApiError> {
    let cmd = SetColorSchemeCommand {
        session_id: req.session_id,
        scheme: parse_color_scheme(&req.scheme)?,
    };

    let result = state.set_color_scheme_handler.handle(cmd).await?;

    Ok(Json(ApiResponse::success(SetColorSchemeResponseDto {
        session_id: result.session_id,
        scheme: result.scheme.as_str().to_string(),
    })))
}

// ============================================================================
// Narration Status
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NarrationStatusRequest {
    pub session_id: String,
    #[serde(default)]
    pub turn_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CueDto {
    pub cue_id: String,
    pub turn_id: String,
    pub segment_index: usize,
    pub text: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

impl From<CueView> for CueDto {
    fn from(view: CueView) -> Self {
        Self {
            cue_id: view.cue_id,
            turn_id: view.turn_id,
            segment_index: view.segment_index,
            text: view.text,
            state: view.state,
            error: view.error,
            created_at: view.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NarrationStatusDto {
    pub session_id: String,
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub done: usize,
    pub errored: usize,
    pub cues: Vec<CueDto>,
}

pub async fn get_narration_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NarrationStatusRequest>,
) -> Result<Json<ApiResponse<NarrationStatusDto>>, ApiError> {
    let turn_id = req.turn_id.as_deref().map(parse_turn_id).transpose()?;

    let query = GetNarrationStatusQuery {
        session_id: req.session_id,
        turn_id,
    };

    let result = state.get_narration_status_handler.handle(query).await?;

    Ok(Json(ApiResponse::success(NarrationStatusDto {
        session_id: result.session_id,
        total: result.total,
        pending: result.pending,
        ready: result.ready,
        done: result.done,
        errored: result.errored,
        cues: result.cues.into_iter().map(CueDto::from).collect(),
    })))
}
