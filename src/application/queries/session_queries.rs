//! Session Queries - 会话相关查询

use crate::domain::conversation::TurnId;

/// 获取会话详情查询
#[derive(Debug, Clone)]
pub struct GetSessionQuery {
    pub session_id: String,
}

/// 列出所有会话查询
#[derive(Debug, Clone)]
pub struct ListSessionsQuery;

/// 获取叙播进度查询
///
/// turn_id 为空时返回整个会话的提示音
#[derive(Debug, Clone)]
pub struct GetNarrationStatusQuery {
    pub session_id: String,
    pub turn_id: Option<TurnId>,
}
