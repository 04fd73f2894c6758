mod chat_session;
mod connection_monitor;
mod relay_chat;
mod retry_controller;

pub use chat_session::*;
pub use connection_monitor::*;
pub use relay_chat::*;
pub use retry_controller::*;
