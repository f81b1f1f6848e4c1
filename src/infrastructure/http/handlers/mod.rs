//! HTTP Handlers

mod controller;
mod credential;
mod ping;
mod session;
mod websocket;

pub use controller::*;
pub use credential::*;
pub use ping::*;
pub use session::*;
pub use websocket::*;
