use super::gpio::OutputPin;
use crate::error::ActuatorError;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Who currently owns the output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Idle,
    Pulsing,
    ContinuousRunning,
}

/// Pin and state live under the same lock so a pulse and the alarm loop
/// can never drive the line at the same time.
struct PinSlot {
    pin: Option<Box<dyn OutputPin>>,
    state: ActuatorState,
}

struct AlarmHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// On/off signaling device with at most one background alarm loop
pub struct Actuator {
    name: String,
    slot: Arc<Mutex<PinSlot>>,
    alarm: SyncMutex<Option<AlarmHandle>>,
}

impl Actuator {
    pub fn new(pin: Box<dyn OutputPin>) -> Self {
        let name = pin.name();
        info!("Actuator initialized on {}", name);
        Self {
            name,
            slot: Arc::new(Mutex::new(PinSlot {
                pin: Some(pin),
                state: ActuatorState::Idle,
            })),
            alarm: SyncMutex::new(None),
        }
    }

    pub async fn state(&self) -> ActuatorState {
        self.slot.lock().await.state
    }

    /// Toggle the output `count` times. Fails with `Busy` while the
    /// continuous alarm owns the line.
    pub async fn pulse(
        &self,
        count: u32,
        on_time: Duration,
        off_time: Duration,
    ) -> Result<(), ActuatorError> {
        let mut slot = self.slot.lock().await;
        if slot.state == ActuatorState::ContinuousRunning {
            warn!("Pulse requested while continuous alarm is running");
            return Err(ActuatorError::Busy);
        }

        slot.state = ActuatorState::Pulsing;
        let result = match slot.pin.as_mut() {
            Some(pin) => pulse_pin(pin.as_mut(), count, on_time, off_time).await,
            None => Err(released(&self.name)),
        };
        slot.state = ActuatorState::Idle;

        match &result {
            Ok(()) => info!("Actuator pulsed {} times", count),
            Err(e) => error!("Actuator pulse failed: {}", e),
        }
        result
    }

    /// Start the background alarm loop. No-op if one is already running.
    pub async fn start_continuous(
        &self,
        on_time: Duration,
        off_time: Duration,
    ) -> Result<(), ActuatorError> {
        if self.is_alarm_running() {
            warn!("Continuous alarm already running");
            return Ok(());
        }

        {
            let mut slot = self.slot.lock().await;
            if slot.pin.is_none() {
                return Err(released(&self.name));
            }
            slot.state = ActuatorState::ContinuousRunning;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(alarm_loop(
            Arc::clone(&self.slot),
            token.clone(),
            on_time,
            off_time,
        ));

        let mut alarm = self.alarm.lock();
        if let Some(previous) = alarm.replace(AlarmHandle { token, task }) {
            // Lost a race with a concurrent start; keep only the newest loop.
            previous.token.cancel();
        }
        info!("Continuous alarm started");
        Ok(())
    }

    pub fn is_alarm_running(&self) -> bool {
        self.alarm
            .lock()
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }

    /// Stop the alarm loop, wait for it to exit and force the output low.
    /// Safe to call when nothing is running.
    pub async fn stop(&self) -> Result<(), ActuatorError> {
        let handle = self.alarm.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        handle.token.cancel();
        if let Err(e) = handle.task.await {
            error!("Alarm task ended abnormally: {}", e);
        }

        let mut slot = self.slot.lock().await;
        slot.state = ActuatorState::Idle;
        let result = match slot.pin.as_mut() {
            Some(pin) => pin.set_low(),
            None => Ok(()),
        };
        info!("Continuous alarm stopped");
        result
    }

    /// Stop any alarm and hand the pin back to the system
    pub async fn release(&self) -> Result<(), ActuatorError> {
        if let Err(e) = self.stop().await {
            warn!("Failed to stop alarm during release: {}", e);
        }

        let mut slot = self.slot.lock().await;
        slot.state = ActuatorState::Idle;
        match slot.pin.take() {
            Some(mut pin) => {
                let result = pin.release();
                match &result {
                    Ok(()) => info!("{} released", self.name),
                    Err(e) => error!("Failed to release {}: {}", self.name, e),
                }
                result
            }
            None => Ok(()),
        }
    }
}

async fn pulse_pin(
    pin: &mut dyn OutputPin,
    count: u32,
    on_time: Duration,
    off_time: Duration,
) -> Result<(), ActuatorError> {
    for _ in 0..count {
        if let Err(e) = pin.set_high() {
            let _ = pin.set_low();
            return Err(e);
        }
        sleep(on_time).await;
        pin.set_low()?;
        sleep(off_time).await;
    }
    Ok(())
}

async fn alarm_loop(
    slot: Arc<Mutex<PinSlot>>,
    token: CancellationToken,
    on_time: Duration,
    off_time: Duration,
) {
    debug!("Alarm loop running");
    while !token.is_cancelled() {
        let mut guard = slot.lock().await;
        let Some(pin) = guard.pin.as_mut() else {
            break;
        };

        if let Err(e) = pin.set_high() {
            error!("Continuous alarm failed: {}", e);
            let _ = pin.set_low();
            break;
        }

        let cancelled = tokio::select! {
            _ = token.cancelled() => true,
            _ = sleep(on_time) => false,
        };

        if let Err(e) = pin.set_low() {
            error!("Continuous alarm failed: {}", e);
            break;
        }
        drop(guard);

        if cancelled {
            break;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(off_time) => {}
        }
    }

    // Exited on a pin fault rather than a stop request
    if !token.is_cancelled() {
        slot.lock().await.state = ActuatorState::Idle;
    }
    debug!("Alarm loop exited");
}

fn released(name: &str) -> ActuatorError {
    ActuatorError::WriteFailed {
        pin: name.to_string(),
        details: "pin released".to_string(),
    }
}
