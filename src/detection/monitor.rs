use super::types::FrameDetections;
use super::Detector;
use crate::config::DetectorConfig;
use crate::frame::Frame;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Called with the failure count and a human-readable message once the
/// detector is considered offline
pub type FailureCallback = Box<dyn Fn(u32, String) + Send + Sync>;

/// Wraps a detector with consecutive-failure accounting and latency warnings
pub struct DetectorMonitor {
    detector: Box<dyn Detector>,
    max_failures: u32,
    inference_warn: Duration,
    failure_count: u32,
    on_failure: Option<FailureCallback>,
}

impl DetectorMonitor {
    pub fn new(detector: Box<dyn Detector>, config: &DetectorConfig) -> Self {
        Self {
            detector,
            max_failures: config.max_failures,
            inference_warn: Duration::from_millis(config.inference_warn_ms),
            failure_count: 0,
            on_failure: None,
        }
    }

    pub fn with_failure_callback(mut self, callback: FailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// Run the detector. Failures are counted and yield an empty result.
    pub async fn detect(&mut self, frame: Option<&Frame>) -> FrameDetections {
        if frame.is_none() {
            warn!("Detector received no frame, skipping detection");
            self.record_failure();
            return FrameDetections::empty();
        }

        let start = Instant::now();
        let result = self.detector.detect(frame).await;
        let elapsed = start.elapsed();

        if elapsed > self.inference_warn {
            warn!(
                "Detection inference time {:.1}ms exceeds {}ms",
                elapsed.as_secs_f64() * 1000.0,
                self.inference_warn.as_millis()
            );
        }

        match result {
            Ok(detections) => {
                self.failure_count = 0;
                detections
            }
            Err(e) => {
                error!("Detection failed on {}: {}", self.detector.name(), e);
                self.record_failure();
                FrameDetections::empty()
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.detector.shutdown().await;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    fn record_failure(&mut self) {
        self.failure_count += 1;

        if self.failure_count >= self.max_failures {
            let message = format!(
                "Detection pipeline offline: {} consecutive failures",
                self.failure_count
            );
            error!("{}. Check model, input, or hardware.", message);
            if let Some(callback) = &self.on_failure {
                callback(self.failure_count, message);
            }
        }
    }
}
