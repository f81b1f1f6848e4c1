//! Memory Layer - In-Memory State Management
//!
//! 实现 SessionStore、CueStore 和 CredentialStore，管理会话、提示音与凭据的内存状态

mod credential_store;
mod cue_store;
mod session_store;

pub use credential_store::InMemoryCredentialStore;
pub use cue_store::InMemoryCueStore;
pub use session_store::{InMemorySessionStore, SessionStoreConfig};
