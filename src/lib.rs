pub mod alerts;
pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod frame;
pub mod tracking;

pub use alerts::{Actuator, AlertDispatcher, AlertOutcome, AlertRecord, ModemDriver};
pub use app::{install_signal_handlers, KeyboardInputHandler, Monitor, StepOutcome};
pub use camera::{CameraState, CameraSupervisor};
pub use config::CoopguardConfig;
pub use detection::{Detector, DetectorMonitor, FrameDetections, SidecarDetector};
pub use error::{CoopguardError, Result};
pub use events::{EventBus, MonitorEvent};
pub use frame::{Frame, FrameFormat};
pub use tracking::{AnomalyRule, TrackStore};
