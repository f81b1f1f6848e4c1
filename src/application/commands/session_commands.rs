//! Session Commands - 会话相关命令

use crate::domain::conversation::ColorScheme;

/// 打开会话命令
#[derive(Debug, Clone)]
pub struct OpenSessionCommand {
    pub player_mode: bool,
    pub color_scheme: ColorScheme,
}

/// 打开会话响应
#[derive(Debug, Clone)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub player_mode: bool,
    pub color_scheme: ColorScheme,
}

/// 关闭会话命令
#[derive(Debug, Clone)]
pub struct CloseSessionCommand {
    pub session_id: String,
}

/// 关闭会话响应
#[derive(Debug, Clone)]
pub struct CloseSessionResponse {
    pub session_id: String,
    pub cancelled_turn: bool,
    pub discarded_cues: usize,
}

/// 叙播开关命令
#[derive(Debug, Clone)]
pub struct SetPlayerModeCommand {
    pub session_id: String,
    pub enabled: bool,
}

/// 叙播开关响应
#[derive(Debug, Clone)]
pub struct SetPlayerModeResponse {
    pub session_id: String,
    pub enabled: bool,
    pub changed: bool,
    /// 关闭时废弃的提示音数量
    pub discarded_cues: usize,
    /// 开启时为进行中回合补建的提示音数量
    pub backfilled_cues: usize,
}

/// 配色切换命令
#[derive(Debug, Clone)]
pub struct SetColorSchemeCommand {
    pub session_id: String,
    pub scheme: ColorScheme,
}

/// 配色切换响应
#[derive(Debug, Clone)]
pub struct SetColorSchemeResponse {
    pub session_id: String,
    pub scheme: ColorScheme,
}

/// 静音开关命令
#[derive(Debug, Clone)]
pub struct SetMuteCommand {
    pub session_id: String,
    pub muted: bool,
}

/// 静音开关响应
#[derive(Debug, Clone)]
pub struct SetMuteResponse {
    pub session_id: String,
    pub muted: bool,
    pub changed: bool,
}
