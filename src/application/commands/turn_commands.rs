//! Turn Commands - 回合相关命令（控制器手势的落点）

use crate::domain::conversation::TurnId;

/// 提交用户输入命令
#[derive(Debug, Clone)]
pub struct SubmitTurnCommand {
    pub session_id: String,
    pub text: String,
}

/// 提交结果
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 交换已开启，流式回合开始驱动
    Started {
        user_turn_id: TurnId,
        assistant_turn_id: TurnId,
        request_id: String,
    },
    /// 进行中回合存在，输入已排队（busy_policy=queue）
    Queued { position: usize },
}

/// 提交用户输入响应
#[derive(Debug, Clone)]
pub struct SubmitTurnResponse {
    pub session_id: String,
    pub outcome: SubmitOutcome,
}

/// 取消在途回合命令
#[derive(Debug, Clone)]
pub struct CancelTurnCommand {
    pub session_id: String,
}

/// 取消在途回合响应
///
/// 无在途回合时 cancelled=false，不视为错误
#[derive(Debug, Clone)]
pub struct CancelTurnResponse {
    pub session_id: String,
    pub cancelled: bool,
    pub turn_id: Option<TurnId>,
    pub discarded_cues: usize,
}
