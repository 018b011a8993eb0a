use crate::error::ActuatorError;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single digital output line
pub trait OutputPin: Send {
    fn set_high(&mut self) -> Result<(), ActuatorError>;
    fn set_low(&mut self) -> Result<(), ActuatorError>;
    /// Give the line back to the system. Further writes fail.
    fn release(&mut self) -> Result<(), ActuatorError>;
    fn name(&self) -> String;
}

/// Output pin driven through the sysfs GPIO interface
pub struct SysfsGpioPin {
    root: PathBuf,
    gpio: u32,
    value: Option<File>,
}

impl SysfsGpioPin {
    /// Export the pin, configure it as an output and drive it low
    pub fn open(root: impl Into<PathBuf>, gpio: u32) -> Result<Self, ActuatorError> {
        let root = root.into();
        let pin_dir = root.join(format!("gpio{}", gpio));
        let name = format!("gpio{}", gpio);

        if !pin_dir.exists() {
            write_attr(&root.join("export"), &gpio.to_string()).map_err(|e| {
                ActuatorError::OpenFailed {
                    pin: name.clone(),
                    details: format!("export failed: {}", e),
                }
            })?;
            debug!("Exported {}", name);
        }

        // udev may need a moment to fix permissions on a freshly exported pin
        let direction = pin_dir.join("direction");
        let mut last_err = None;
        for _ in 0..10 {
            match write_attr(&direction, "out") {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    thread::sleep(Duration::from_millis(20));
                }
            }
        }
        if let Some(e) = last_err {
            return Err(ActuatorError::OpenFailed {
                pin: name,
                details: format!("direction failed: {}", e),
            });
        }

        let value = OpenOptions::new()
            .write(true)
            .open(pin_dir.join("value"))
            .map_err(|e| ActuatorError::OpenFailed {
                pin: name.clone(),
                details: format!("value open failed: {}", e),
            })?;

        let mut pin = Self {
            root,
            gpio,
            value: Some(value),
        };
        pin.set_low()?;

        info!("Output {} ready", name);
        Ok(pin)
    }

    fn write_value(&mut self, level: &[u8]) -> Result<(), ActuatorError> {
        let name = self.name();
        let file = self.value.as_mut().ok_or_else(|| ActuatorError::WriteFailed {
            pin: name.clone(),
            details: "pin released".to_string(),
        })?;

        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(level))
            .and_then(|_| file.flush())
            .map_err(|e| ActuatorError::WriteFailed {
                pin: name,
                details: e.to_string(),
            })
    }
}

impl OutputPin for SysfsGpioPin {
    fn set_high(&mut self) -> Result<(), ActuatorError> {
        self.write_value(b"1")
    }

    fn set_low(&mut self) -> Result<(), ActuatorError> {
        self.write_value(b"0")
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        if self.value.is_none() {
            return Ok(());
        }

        let low = self.set_low();
        self.value = None;

        if let Err(e) = write_attr(&self.root.join("unexport"), &self.gpio.to_string()) {
            warn!("Failed to unexport {}: {}", self.name(), e);
        }

        low
    }

    fn name(&self) -> String {
        format!("gpio{}", self.gpio)
    }
}

impl Drop for SysfsGpioPin {
    fn drop(&mut self) {
        if self.value.is_some() {
            let _ = self.release();
        }
    }
}

fn write_attr(path: &std::path::Path, value: &str) -> std::io::Result<()> {
    fs::write(path, value)
}
