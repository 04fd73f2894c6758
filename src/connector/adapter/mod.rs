mod console_renderer;
mod http_error;
mod mock_completion;
mod openai_completion_client;
mod recording_renderer;
mod relay_http_client;

pub use console_renderer::*;
pub use http_error::API_NOT_CONFIGURED;
pub use mock_completion::*;
pub use openai_completion_client::*;
pub use recording_renderer::*;
pub use relay_http_client::*;
