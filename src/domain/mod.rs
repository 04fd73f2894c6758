//! # Domain Layer
//!
//! Conversation models, the event-stream frame codec, and the error taxonomy.
//! This layer is independent of HTTP clients, servers, and terminals.

pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::*;
