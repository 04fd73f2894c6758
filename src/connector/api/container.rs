use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::application::{CompletionService, RelayChatUseCase};
use crate::connector::adapter::{MockCompletionService, OpenAiCompletionClient};
use crate::domain::{DomainError, ServerInfo, StatusReport};

pub const PRODUCTION: &str = "production";
const MOCK_PACE: Duration = Duration::from_millis(40);

pub struct ContainerConfig {
    /// Upstream credentials. `None` (or blank) leaves chat unavailable while
    /// the server still starts and answers status probes.
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub environment: String,
    pub port: u16,
    /// Serve an in-process echo upstream instead of calling the real API.
    pub mock_upstream: bool,
}

/// Composition root for the relay server.
pub struct Container {
    relay: Option<Arc<RelayChatUseCase>>,
    config: ContainerConfig,
}

impl Container {
    pub fn new(config: ContainerConfig) -> Self {
        let completion: Option<Arc<dyn CompletionService>> = if config.mock_upstream {
            info!("Using mock upstream completion service");
            Some(Arc::new(MockCompletionService::echo().paced(MOCK_PACE)))
        } else {
            match config.api_key.as_deref().map(str::trim) {
                Some(key) if !key.is_empty() => {
                    let client = OpenAiCompletionClient::new(key, &config.api_url, &config.model);
                    info!(
                        "Upstream API configured: {} (model {})",
                        client.masked_url(),
                        config.model
                    );
                    Some(Arc::new(client))
                }
                _ => {
                    warn!("DEEPSEEK_API_KEY is not set; chat requests will be refused");
                    None
                }
            }
        };
        Self::with_completion(config, completion)
    }

    /// Build around an already constructed upstream.
    pub fn with_completion(
        config: ContainerConfig,
        completion: Option<Arc<dyn CompletionService>>,
    ) -> Self {
        debug!("Environment: {}", config.environment);
        Self {
            relay: completion.map(|c| Arc::new(RelayChatUseCase::new(c))),
            config,
        }
    }

    pub fn relay_use_case(&self) -> Result<Arc<RelayChatUseCase>, DomainError> {
        self.relay
            .clone()
            .ok_or_else(|| DomainError::configuration("API key is not configured on the server"))
    }

    pub fn is_api_configured(&self) -> bool {
        self.relay.is_some()
    }

    pub fn is_production(&self) -> bool {
        self.config.environment == PRODUCTION
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::ok(ServerInfo {
            port: self.config.port,
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_configured: self.is_api_configured(),
            environment: self.config.environment.clone(),
        })
    }
}
