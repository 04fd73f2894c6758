use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::application::{ChatTransport, TurnRenderer};
use crate::domain::ConnectionStatus;

/// Single owner of the process-wide [`ConnectionStatus`].
///
/// All writes go through [`ConnectionMonitor::probe`] (serialized), so readers
/// never observe a half-applied probe. Other components either read the
/// current value or subscribe to changes.
///
/// Input is enabled only while the status accepts turns and no turn is in
/// flight.
pub struct ConnectionMonitor {
    transport: Arc<dyn ChatTransport>,
    renderer: Arc<dyn TurnRenderer>,
    status: watch::Sender<ConnectionStatus>,
    probe_lock: Mutex<()>,
    turn_active: AtomicBool,
}

impl ConnectionMonitor {
    pub fn new(transport: Arc<dyn ChatTransport>, renderer: Arc<dyn TurnRenderer>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Unknown);
        Self {
            transport,
            renderer,
            status,
            probe_lock: Mutex::new(()),
            turn_active: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Mark the start or end of a turn and update input accordingly.
    pub fn set_turn_active(&self, active: bool) {
        self.turn_active.store(active, Ordering::Release);
        self.renderer
            .set_input_enabled(!active && self.status().accepts_turns());
    }

    /// Ask the relay for its status and publish the result.
    ///
    /// `manual` probes (user-initiated) also report progress and success;
    /// problems are always reported.
    pub async fn probe(&self, manual: bool) -> ConnectionStatus {
        let _guard = self.probe_lock.lock().await;

        self.publish(ConnectionStatus::Checking);
        if manual {
            self.renderer.show_notice("Checking server connection...");
        }

        let status = match self.transport.fetch_status().await {
            Ok(report) if report.server_info.api_configured => {
                info!("Relay online, upstream API configured");
                if manual {
                    self.renderer
                        .show_notice("Server connection OK, API configured");
                }
                ConnectionStatus::Online
            }
            Ok(_) => {
                warn!("Relay online but upstream API is not configured");
                self.renderer.show_notice(
                    "The API is not configured on the server; chat is unavailable. \
                     Check the server's environment variables.",
                );
                ConnectionStatus::ConfigurationWarning
            }
            Err(e) if e.status_code().is_some() => {
                warn!("Status probe failed: {}", e);
                self.renderer
                    .show_notice(&format!("Server connection error: {}", e));
                ConnectionStatus::Error
            }
            Err(e) => {
                warn!("Relay unreachable: {}", e);
                self.renderer.show_notice(
                    "Cannot reach the server. Check your network connection or the server status.",
                );
                ConnectionStatus::Offline
            }
        };

        self.publish(status);
        status
    }

    fn publish(&self, status: ConnectionStatus) {
        debug!("Connection status -> {}", status);
        self.status.send_replace(status);
        self.renderer.show_status(status);
        self.renderer.set_input_enabled(
            status.accepts_turns() && !self.turn_active.load(Ordering::Acquire),
        );
    }
}
