use clap::Subcommand;

use crate::application::MAX_RETRIES;
use crate::connector::adapter::{DEFAULT_API_URL, DEFAULT_MODEL, DEFAULT_SERVER_URL};

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, env = "PORT", default_value = "3000")]
        port: u16,

        /// `production` hides error details from clients
        #[arg(short, long, env = "RELAY_ENV", default_value = "development")]
        environment: String,

        /// Answer from an in-process echo model instead of the upstream API
        #[arg(long)]
        mock_upstream: bool,

        #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long, env = "DEEPSEEK_API_URL", default_value = DEFAULT_API_URL)]
        api_url: String,

        #[arg(long, env = "DEEPSEEK_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
    },

    /// Chat with a running relay from the terminal
    Chat {
        #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
        server: String,

        #[arg(long)]
        system_prompt: Option<String>,

        #[arg(long, default_value_t = MAX_RETRIES)]
        max_retries: u32,

        #[arg(long, default_value = "1000")]
        retry_delay_ms: u64,

        /// Seconds to wait for the relay to answer, and then for each stream chunk
        #[arg(long, default_value = "60")]
        turn_timeout_secs: u64,
    },

    /// Print the relay's status report
    Status {
        #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
}
