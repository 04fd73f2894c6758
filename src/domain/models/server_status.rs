use serde::{Deserialize, Serialize};

/// Body of `GET /api/status`. Reflects local configuration only; building it
/// never touches the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub version: String,
    pub api_configured: bool,
    #[serde(default)]
    pub environment: String,
}

impl StatusReport {
    pub fn ok(server_info: ServerInfo) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: current_timestamp_millis(),
            server_info,
        }
    }
}

fn current_timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
