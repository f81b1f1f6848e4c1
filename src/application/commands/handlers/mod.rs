//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod credential_command_handlers;
mod session_command_handlers;
mod turn_command_handlers;

pub use credential_command_handlers::*;
pub use session_command_handlers::*;
pub use turn_command_handlers::*;
