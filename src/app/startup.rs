use super::Monitor;
use crate::alerts::{Actuator, AlertDispatcher, ModemDriver, SysfsGpioPin};
use crate::camera::{factory_for, CameraSupervisor};
use crate::config::CoopguardConfig;
use crate::detection::SidecarDetector;
use crate::error::Result;
use crate::events::EventBus;
use crate::tracking::TrackStore;
use tracing::{error, info};

impl Monitor {
    /// Acquire the hardware named by `config` and assemble the monitor.
    ///
    /// Failing to open the actuator pin, the modem port or the camera is
    /// fatal. Anything acquired before the failure is released on drop.
    pub async fn from_config(config: &CoopguardConfig, event_bus: EventBus) -> Result<Self> {
        info!("Initializing monitor components");

        let pin = SysfsGpioPin::open(&config.actuator.gpio_root, config.actuator.gpio)
            .map_err(|e| {
                error!("Failed to initialize actuator: {}", e);
                e
            })?;
        let actuator = Actuator::new(Box::new(pin));

        let modem = ModemDriver::open(config.modem.clone()).await.map_err(|e| {
            error!("Failed to initialize modem: {}", e);
            e
        })?;

        let dispatcher = AlertDispatcher::new(actuator, modem, config.alerts.clone());

        let factory = factory_for(&config.camera)?;
        let camera = CameraSupervisor::new(config.camera.clone(), factory)
            .await
            .map_err(|e| {
                error!("Failed to initialize camera: {}", e);
                e
            })?;

        let detector = SidecarDetector::spawn(&config.detector.results_path);
        let tracks = TrackStore::from_config(&config.zones, &config.tracking);
        if !tracks.is_empty() {
            info!("Resuming with {} tracks", tracks.len());
        }

        info!("All monitor components initialized");
        Ok(Monitor::new(
            camera,
            Box::new(detector),
            &config.detector,
            tracks,
            dispatcher,
            event_bus,
        ))
    }
}
