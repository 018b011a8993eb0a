use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoopguardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Modem error: {0}")]
    Modem(#[from] ModemError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CoopguardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Video source failures
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Failed to open camera source {source_id}: {details}")]
    OpenFailed { source_id: String, details: String },

    #[error("Camera source {source_id} did not report itself open")]
    NotOpened { source_id: String },

    #[error("Frame read failed: {details}")]
    ReadFailed { details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Camera backend not available on this platform")]
    NotAvailable,
}

/// Serial modem failures
#[derive(Error, Debug, Clone)]
pub enum ModemError {
    #[error("Failed to open serial port {port}: {details}")]
    OpenFailed { port: String, details: String },

    #[error("Serial write failed: {details}")]
    WriteFailed { details: String },

    #[error("Serial read failed: {details}")]
    ReadFailed { details: String },

    #[error("No '{expected}' in response to '{command}' within {timeout:?}")]
    Timeout {
        command: String,
        expected: String,
        timeout: Duration,
    },
}

/// Output pin failures
#[derive(Error, Debug, Clone)]
pub enum ActuatorError {
    #[error("Failed to open output {pin}: {details}")]
    OpenFailed { pin: String, details: String },

    #[error("Failed to drive output {pin}: {details}")]
    WriteFailed { pin: String, details: String },

    #[error("Actuator busy: continuous alarm is running")]
    Busy,
}

/// Detector boundary failures
#[derive(Error, Debug, Clone)]
pub enum DetectorError {
    #[error("Detector received no frame")]
    MissingFrame,

    #[error("Detector unavailable: {details}")]
    Unavailable { details: String },

    #[error("Malformed detection result: {details}")]
    Malformed { details: String },
}

pub type Result<T> = std::result::Result<T, CoopguardError>;
