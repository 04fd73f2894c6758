pub mod chat_controller;
pub mod status_controller;

pub use chat_controller::{ChatController, ChatParams};
pub use status_controller::StatusController;
