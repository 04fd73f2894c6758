mod connection_status;
mod frame;
mod history;
mod message;
mod server_status;
mod turn;

pub use connection_status::*;
pub use frame::*;
pub use history::*;
pub use message::*;
pub use server_status::*;
pub use turn::*;
