use super::Monitor;
use crate::error::Result;
use crate::events::{EventBus, MonitorEvent};
use std::time::SystemTime;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl Monitor {
    /// Run the control loop until `token` is cancelled, then shut down
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        info!("Coopguard monitor is running");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.step() => {}
            }
        }

        info!("Shutdown initiated");
        self.shutdown().await;
        Ok(())
    }
}

/// Cancel `token` on SIGINT or SIGTERM
pub fn install_signal_handlers(token: CancellationToken, event_bus: EventBus) {
    #[cfg(unix)]
    {
        let token = token.clone();
        let event_bus = event_bus.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = token.cancelled() => {}
                Some(()) = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    request_shutdown(&token, &event_bus, "SIGTERM");
                }
            }
        });
    }

    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            Ok(()) = signal::ctrl_c() => {
                info!("Received SIGINT signal (Ctrl+C)");
                request_shutdown(&token, &event_bus, "SIGINT");
            }
        }
    });
}

pub(super) fn request_shutdown(token: &CancellationToken, event_bus: &EventBus, reason: &str) {
    event_bus.publish(MonitorEvent::ShutdownRequested {
        timestamp: SystemTime::now(),
        reason: reason.to_string(),
    });
    token.cancel();
}
