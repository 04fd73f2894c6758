mod chat_transport;
mod completion_service;
mod turn_renderer;

pub use chat_transport::*;
pub use completion_service::*;
pub use turn_renderer::*;
