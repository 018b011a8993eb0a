use super::Monitor;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl Monitor {
    /// Release everything in reverse dependency order. Never fails; each
    /// step is logged and the next one runs regardless.
    pub async fn shutdown(mut self) {
        info!("Beginning graceful shutdown");

        if timeout(STOP_TIMEOUT, self.dispatcher.stop_continuous_alarm())
            .await
            .is_err()
        {
            error!("Timed out stopping continuous alarm");
        }

        // Waits for any in-flight alert to release the modem
        if timeout(STOP_TIMEOUT, self.dispatcher.close()).await.is_err() {
            error!("Timed out releasing alert hardware");
        }

        self.camera.release();
        self.detector.shutdown().await;

        self.tracks.save();

        info!("Graceful shutdown completed");
    }
}
