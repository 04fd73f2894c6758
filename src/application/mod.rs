//! # Application Layer
//!
//! Ports to the outside world and the use cases that drive a chat turn:
//! the server-side relay, the client-side session, retries, and status probes.

pub mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;
