use super::actuator::Actuator;
use super::modem::ModemDriver;
use crate::config::AlertConfig;
use crate::events::{EventBus, MonitorEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How an alert fared across its two channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOutcome {
    Success,
    Partial,
    Failure,
}

impl fmt::Display for AlertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertOutcome::Success => write!(f, "success"),
            AlertOutcome::Partial => write!(f, "partial"),
            AlertOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// Result of one dispatched alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub actuator_ok: bool,
    pub modem_ok: bool,
}

impl AlertRecord {
    pub fn outcome(&self) -> AlertOutcome {
        match (self.actuator_ok, self.modem_ok) {
            (true, true) => AlertOutcome::Success,
            (false, false) => AlertOutcome::Failure,
            _ => AlertOutcome::Partial,
        }
    }
}

#[derive(Debug, Default)]
struct CooldownState {
    /// Completion time of the last alert task
    last_alert: Option<Instant>,
    in_flight: bool,
}

/// Stamps completion time even if the alert task panics
struct InFlightGuard {
    cooldown: Arc<SyncMutex<CooldownState>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut cooldown = self.cooldown.lock();
        cooldown.last_alert = Some(Instant::now());
        cooldown.in_flight = false;
    }
}

/// Cooldown-gated fan-out to the actuator and the modem
pub struct AlertDispatcher {
    actuator: Arc<Actuator>,
    modem: Arc<Mutex<ModemDriver>>,
    config: AlertConfig,
    cooldown: Arc<SyncMutex<CooldownState>>,
    event_bus: Option<EventBus>,
}

impl AlertDispatcher {
    pub fn new(actuator: Actuator, modem: ModemDriver, config: AlertConfig) -> Self {
        info!(
            "Alert dispatcher ready (cooldown {}s, continuous alarm: {})",
            config.cooldown_seconds, config.continuous_alarm
        );
        Self {
            actuator: Arc::new(actuator),
            modem: Arc::new(Mutex::new(modem)),
            config,
            cooldown: Arc::new(SyncMutex::new(CooldownState::default())),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Schedule an alert unless one ran too recently or is still running.
    /// Never blocks; returns the handle of the spawned alert task.
    pub fn trigger(&self, message: &str) -> Option<JoinHandle<AlertRecord>> {
        {
            let mut cooldown = self.cooldown.lock();

            let reason = if cooldown.in_flight {
                Some("alert already in progress".to_string())
            } else {
                cooldown
                    .last_alert
                    .map(|last| last.elapsed())
                    .filter(|elapsed| *elapsed < self.config.cooldown())
                    .map(|elapsed| {
                        format!(
                            "cooldown active ({:.0}s of {}s elapsed)",
                            elapsed.as_secs_f64(),
                            self.config.cooldown_seconds
                        )
                    })
            };

            if let Some(reason) = reason {
                info!("Alert skipped: {}", reason);
                self.publish(MonitorEvent::AlertSuppressed {
                    message: message.to_string(),
                    reason,
                });
                return None;
            }

            cooldown.in_flight = true;
        }

        let guard = InFlightGuard {
            cooldown: Arc::clone(&self.cooldown),
        };

        Some(tokio::spawn(run_alert(
            guard,
            message.to_string(),
            Arc::clone(&self.actuator),
            Arc::clone(&self.modem),
            self.config.clone(),
            self.event_bus.clone(),
        )))
    }

    /// Stop the continuous alarm and wait for its loop to exit
    pub async fn stop_continuous_alarm(&self) {
        if !self.config.continuous_alarm && !self.actuator.is_alarm_running() {
            return;
        }
        if let Err(e) = self.actuator.stop().await {
            error!("Failed to stop continuous alarm: {}", e);
        }
    }

    /// True while an alert task is running
    pub fn is_alert_in_flight(&self) -> bool {
        self.cooldown.lock().in_flight
    }

    pub fn actuator(&self) -> &Actuator {
        &self.actuator
    }

    /// Release the actuator pin and close the modem link
    pub async fn close(&self) {
        if let Err(e) = self.actuator.release().await {
            error!("Actuator release failed: {}", e);
        }
        self.modem.lock().await.close();
    }

    fn publish(&self, event: MonitorEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

async fn run_alert(
    _guard: InFlightGuard,
    message: String,
    actuator: Arc<Actuator>,
    modem: Arc<Mutex<ModemDriver>>,
    config: AlertConfig,
    event_bus: Option<EventBus>,
) -> AlertRecord {
    let triggered_at = Utc::now();
    warn!("ALERT: {}", message);

    let signal = async {
        let result = if config.continuous_alarm {
            actuator
                .start_continuous(config.beep_on(), config.beep_off())
                .await
        } else {
            actuator
                .pulse(config.beep_count, config.beep_on(), config.beep_off())
                .await
        };
        if let Err(e) = &result {
            error!("Actuator failed during alert: {}", e);
        }
        result.is_ok()
    };

    let notify = async {
        let mut modem = modem.lock().await;
        let retries = modem.sms_retries();
        let sent = modem.send_sms(&message, retries).await;
        if sent && config.call_on_alert {
            modem.make_call(config.call_duration()).await;
        }
        sent
    };

    let (actuator_ok, modem_ok) = tokio::join!(signal, notify);

    let record = AlertRecord {
        id: Uuid::new_v4(),
        message,
        triggered_at,
        actuator_ok,
        modem_ok,
    };

    match record.outcome() {
        AlertOutcome::Success => info!("Alert '{}' dispatched", record.message),
        AlertOutcome::Partial => warn!(
            "Alert '{}' partially dispatched (actuator: {}, sms: {})",
            record.message, actuator_ok, modem_ok
        ),
        AlertOutcome::Failure => error!("Alert '{}' failed on every channel", record.message),
    }

    if let Some(bus) = event_bus {
        bus.publish(MonitorEvent::AlertCompleted {
            record: record.clone(),
        });
    }

    record
}
