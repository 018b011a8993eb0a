use super::source::{SourceFactory, VideoSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Health of the camera source as seen by the supervisor
#[derive(Debug, Clone)]
pub struct CameraState {
    pub alive: bool,
    pub consecutive_failures: u32,
    /// Wait before the next reinitialization attempt; at least one second, capped
    pub backoff: Duration,
    pub last_alive_at: Instant,
}

impl CameraState {
    fn new() -> Self {
        Self {
            alive: false,
            consecutive_failures: 0,
            backoff: INITIAL_BACKOFF,
            last_alive_at: Instant::now(),
        }
    }

    fn mark_alive(&mut self) {
        self.alive = true;
        self.consecutive_failures = 0;
        self.backoff = INITIAL_BACKOFF;
        self.last_alive_at = Instant::now();
    }
}

/// Owns the video source handle and keeps it alive across intermittent failures
pub struct CameraSupervisor {
    config: CameraConfig,
    factory: Box<dyn SourceFactory>,
    source: Option<Box<dyn VideoSource>>,
    state: CameraState,
}

impl CameraSupervisor {
    /// Open the configured source. Failing to open here is fatal for the caller.
    pub async fn new(config: CameraConfig, factory: Box<dyn SourceFactory>) -> Result<Self> {
        info!(
            "Initializing camera supervisor for source {} ({}x{} @ {}fps)",
            factory.describe(&config),
            config.resolution.0,
            config.resolution.1,
            config.fps
        );

        let mut supervisor = Self {
            config,
            factory,
            source: None,
            state: CameraState::new(),
        };

        supervisor.open_source().await?;
        supervisor.state.mark_alive();

        Ok(supervisor)
    }

    /// Read one frame. `None` means no frame this iteration; the caller simply retries.
    pub async fn read(&mut self) -> Option<Frame> {
        if !self.state.alive {
            error!(
                "Camera is not alive, backing off for {:?} before reinitializing",
                self.state.backoff
            );
            sleep(self.state.backoff).await;
            self.state.backoff = (self.state.backoff * 2).min(self.max_backoff());
            self.reinitialize().await;
            return None;
        }

        let result = match self.source.as_mut() {
            Some(source) => source.read().await,
            None => Err(CameraError::ReadFailed {
                details: "no source handle".to_string(),
            }),
        };

        match result {
            Ok(Some(frame)) => {
                self.state.consecutive_failures = 0;
                self.state.backoff = INITIAL_BACKOFF;
                self.state.last_alive_at = Instant::now();
                Some(frame)
            }
            Ok(None) => {
                self.record_failure("no frame captured").await;
                None
            }
            Err(e) => {
                self.record_failure(&e.to_string()).await;
                None
            }
        }
    }

    /// True once the camera has been dead for longer than the offline threshold
    pub fn offline_too_long(&self) -> bool {
        !self.state.alive && self.state.last_alive_at.elapsed() > self.config.offline_alert_after()
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Release the source handle
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            match source.release() {
                Ok(()) => info!("Camera released"),
                Err(e) => error!("Camera release failed: {}", e),
            }
        }
        self.state.alive = false;
    }

    async fn record_failure(&mut self, reason: &str) {
        self.state.consecutive_failures += 1;
        warn!(
            "Camera read failed: {}. Failure count: {}",
            reason, self.state.consecutive_failures
        );

        if self.state.consecutive_failures >= self.config.max_failures {
            error!("Max consecutive camera failures reached, attempting reinitialization");
            self.state.alive = false;
            self.reinitialize().await;
        }
    }

    /// Drop the current handle and try to open a fresh one
    async fn reinitialize(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.release() {
                debug!("Ignoring release error during reinitialization: {}", e);
            }
        }

        match self.open_source().await {
            Ok(()) => {
                info!("Camera reinitialized");
                self.state.mark_alive();
            }
            Err(e) => {
                error!("Camera reinitialization failed: {}", e);
                self.state.alive = false;
            }
        }
    }

    async fn open_source(&mut self) -> std::result::Result<(), CameraError> {
        let source = self.factory.open(&self.config).await?;

        if !source.is_opened() {
            let mut source = source;
            let _ = source.release();
            return Err(CameraError::NotOpened {
                source_id: self.config.source.clone(),
            });
        }

        if let Some(props) = source.properties() {
            debug!(
                "Camera properties: width={}, height={}, fps={:.1}",
                props.width, props.height, props.fps
            );
        }

        self.source = Some(source);
        Ok(())
    }

    fn max_backoff(&self) -> Duration {
        self.config.max_backoff().max(INITIAL_BACKOFF)
    }
}
