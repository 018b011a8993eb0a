use crate::alerts::AlertDispatcher;
use crate::camera::CameraSupervisor;
use crate::config::DetectorConfig;
use crate::detection::{split_detections, Detector, DetectorMonitor};
use crate::events::{EventBus, MonitorEvent};
use crate::frame::Frame;
use crate::tracking::TrackStore;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, trace};

pub const CAMERA_OFFLINE_MESSAGE: &str = "CAMERA OFFLINE TOO LONG";
pub const THEFT_MESSAGE: &str = "HEN THEFT DETECTED";

/// What a single pass of the control loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The camera produced nothing; retry next pass
    NoFrame,
    Processed,
    AnomalyDetected,
}

/// The control loop: camera read, detect, track, evaluate, alert
pub struct Monitor {
    pub(super) camera: CameraSupervisor,
    pub(super) detector: DetectorMonitor,
    pub(super) tracks: TrackStore,
    pub(super) dispatcher: Arc<AlertDispatcher>,
    pub(super) event_bus: EventBus,
    latest_frame: watch::Sender<Option<Frame>>,
    camera_alive: bool,
}

impl Monitor {
    /// Assemble a monitor from already constructed components.
    /// Detector escalations are routed to the dispatcher.
    pub fn new(
        camera: CameraSupervisor,
        detector: Box<dyn Detector>,
        detector_config: &DetectorConfig,
        tracks: TrackStore,
        dispatcher: AlertDispatcher,
        event_bus: EventBus,
    ) -> Self {
        let dispatcher = Arc::new(dispatcher.with_event_bus(event_bus.clone()));

        let escalation_dispatcher = Arc::clone(&dispatcher);
        let escalation_bus = event_bus.clone();
        let detector = DetectorMonitor::new(detector, detector_config).with_failure_callback(
            Box::new(move |consecutive_failures, message| {
                escalation_bus.publish(MonitorEvent::DetectorOffline {
                    consecutive_failures,
                });
                escalation_dispatcher.trigger(&message);
            }),
        );

        let (latest_frame, _) = watch::channel(None);
        let camera_alive = camera.is_alive();

        Self {
            camera,
            detector,
            tracks,
            dispatcher,
            event_bus,
            latest_frame,
            camera_alive,
        }
    }

    /// Read-only view of the most recent frame for a presentation layer
    pub fn latest_frame(&self) -> watch::Receiver<Option<Frame>> {
        self.latest_frame.subscribe()
    }

    pub fn dispatcher(&self) -> Arc<AlertDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    /// One pass of the control loop
    pub async fn step(&mut self) -> StepOutcome {
        if self.camera.offline_too_long() {
            self.dispatcher.trigger(CAMERA_OFFLINE_MESSAGE);
        }

        let frame = self.camera.read().await;
        self.note_camera_status();

        let Some(frame) = frame else {
            return StepOutcome::NoFrame;
        };

        trace!("Processing frame {}", frame.id);
        self.latest_frame.send_replace(Some(frame.clone()));

        let detections = self.detector.detect(Some(&frame)).await;
        let (primaries, secondaries) = split_detections(&mut self.tracks, &detections);

        if primaries.is_empty() {
            return StepOutcome::Processed;
        }

        match self.tracks.find_anomaly(&primaries, &secondaries) {
            Some(anomaly) => {
                self.event_bus.publish(MonitorEvent::AnomalyDetected {
                    track_id: anomaly.track_id,
                    velocity: anomaly.velocity,
                    nearby: anomaly.nearby,
                    timestamp: SystemTime::now(),
                });
                self.dispatcher.trigger(THEFT_MESSAGE);
                StepOutcome::AnomalyDetected
            }
            None => StepOutcome::Processed,
        }
    }

    fn note_camera_status(&mut self) {
        let alive = self.camera.is_alive();
        if alive != self.camera_alive {
            debug!("Camera status changed: alive={}", alive);
            self.camera_alive = alive;
            self.event_bus.publish(MonitorEvent::CameraStatusChanged {
                alive,
                timestamp: SystemTime::now(),
            });
        }
    }
}
