//! # Connector Layer
//!
//! External integrations implementing application interfaces:
//! - Upstream completion clients (OpenAI-compatible HTTP, in-process mock)
//! - The relay's own HTTP client and terminal renderers for the chat front-end
//! - The axum API serving `/api/status` and `/api/chat`

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;
