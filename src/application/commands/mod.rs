//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：处理所有写操作

mod credential_commands;
mod session_commands;
mod turn_commands;

pub mod handlers;

pub use credential_commands::*;
pub use session_commands::*;
pub use turn_commands::*;
