use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoopguardConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub zones: ZoneConfig,
    pub tracking: TrackingConfig,
    pub alerts: AlertConfig,
    pub modem: ModemConfig,
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Video source: device index ("0"), device path, pipeline URI, or "mock"
    #[serde(default = "default_camera_source")]
    pub source: String,

    /// Requested resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Requested frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Consecutive read failures before the source is declared dead
    #[serde(default = "default_camera_max_failures")]
    pub max_failures: u32,

    /// Seconds without a good frame before "camera offline" is raised
    #[serde(default = "default_offline_alert_seconds")]
    pub offline_alert_seconds: u64,

    /// Upper bound for the reinitialization backoff
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: u64,

    /// How long a single frame read may block
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// File or FIFO the external tracker writes JSON-lines results to
    #[serde(default = "default_results_path")]
    pub results_path: String,

    /// Consecutive failures before the pipeline is reported offline
    #[serde(default = "default_detector_max_failures")]
    pub max_failures: u32,

    /// Inference latency above which a warning is logged
    #[serde(default = "default_inference_warn_ms")]
    pub inference_warn_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZoneConfig {
    /// Radius in pixels within which a secondary entity counts as nearby
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: f64,

    /// Speed in pixels per second above which movement is suspicious
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: f64,

    /// Minimum number of nearby secondary entities
    #[serde(default = "default_theft_count_threshold")]
    pub theft_count_threshold: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    /// Where track state is persisted; persistence is disabled when unset
    #[serde(default)]
    pub persist_path: Option<String>,

    /// Minimum seconds between two saves
    #[serde(default = "default_save_interval_seconds")]
    pub save_interval_seconds: f64,

    /// Tracks with no update for this long are evicted
    #[serde(default = "default_stale_timeout_seconds")]
    pub stale_timeout_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    /// Minimum seconds between dispatched alerts
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Sound the buzzer until stopped instead of a short beep sequence
    #[serde(default)]
    pub continuous_alarm: bool,

    #[serde(default = "default_beep_count")]
    pub beep_count: u32,

    #[serde(default = "default_beep_on_ms")]
    pub beep_on_ms: u64,

    #[serde(default = "default_beep_off_ms")]
    pub beep_off_ms: u64,

    /// Place a voice call after the SMS
    #[serde(default)]
    pub call_on_alert: bool,

    #[serde(default = "default_call_duration_seconds")]
    pub call_duration_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModemConfig {
    #[serde(default = "default_modem_port")]
    pub port: String,

    #[serde(default = "default_modem_baud")]
    pub baud: u32,

    /// Destination for SMS and voice calls
    #[serde(default)]
    pub phone: String,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause between failed SMS attempts
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,

    /// Pause after the message body so the modem can transmit it
    #[serde(default = "default_post_send_pause_ms")]
    pub post_send_pause_ms: u64,

    #[serde(default = "default_sms_retries")]
    pub sms_retries: u32,

    #[serde(default = "default_probe_command")]
    pub probe_command: String,

    #[serde(default = "default_text_mode_command")]
    pub text_mode_command: String,

    #[serde(default = "default_compose_command")]
    pub compose_command: String,

    #[serde(default = "default_dial_command")]
    pub dial_command: String,

    #[serde(default = "default_hangup_command")]
    pub hangup_command: String,

    #[serde(default = "default_ok_token")]
    pub ok_token: String,

    #[serde(default = "default_prompt_token")]
    pub prompt_token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ActuatorConfig {
    /// BCM line number of the buzzer output
    #[serde(default = "default_actuator_gpio")]
    pub gpio: u32,

    /// sysfs GPIO root
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
}

impl CameraConfig {
    pub fn offline_alert_after(&self) -> Duration {
        Duration::from_secs(self.offline_alert_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn beep_on(&self) -> Duration {
        Duration::from_millis(self.beep_on_ms)
    }

    pub fn beep_off(&self) -> Duration {
        Duration::from_millis(self.beep_off_ms)
    }

    pub fn call_duration(&self) -> Duration {
        Duration::from_secs(self.call_duration_seconds)
    }
}

impl ModemConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    pub fn post_send_pause(&self) -> Duration {
        Duration::from_millis(self.post_send_pause_ms)
    }
}

impl CoopguardConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("coopguard.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.source", default_camera_source())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.max_failures", default_camera_max_failures())?
            .set_default(
                "camera.offline_alert_seconds",
                default_offline_alert_seconds(),
            )?
            .set_default("camera.max_backoff_seconds", default_max_backoff_seconds())?
            .set_default("camera.read_timeout_ms", default_read_timeout_ms())?
            .set_default("detector.results_path", default_results_path())?
            .set_default("detector.max_failures", default_detector_max_failures())?
            .set_default("detector.inference_warn_ms", default_inference_warn_ms())?
            .set_default("zones.pixel_threshold", default_pixel_threshold())?
            .set_default("zones.velocity_threshold", default_velocity_threshold())?
            .set_default(
                "zones.theft_count_threshold",
                default_theft_count_threshold() as i64,
            )?
            .set_default(
                "tracking.save_interval_seconds",
                default_save_interval_seconds(),
            )?
            .set_default(
                "tracking.stale_timeout_seconds",
                default_stale_timeout_seconds(),
            )?
            .set_default("alerts.cooldown_seconds", default_cooldown_seconds())?
            .set_default("alerts.continuous_alarm", false)?
            .set_default("alerts.beep_count", default_beep_count())?
            .set_default("alerts.beep_on_ms", default_beep_on_ms())?
            .set_default("alerts.beep_off_ms", default_beep_off_ms())?
            .set_default("alerts.call_on_alert", false)?
            .set_default(
                "alerts.call_duration_seconds",
                default_call_duration_seconds(),
            )?
            .set_default("modem.port", default_modem_port())?
            .set_default("modem.baud", default_modem_baud())?
            .set_default("modem.phone", "")?
            .set_default("modem.command_timeout_ms", default_command_timeout_ms())?
            .set_default("modem.poll_interval_ms", default_poll_interval_ms())?
            .set_default("modem.retry_pause_ms", default_retry_pause_ms())?
            .set_default("modem.post_send_pause_ms", default_post_send_pause_ms())?
            .set_default("modem.sms_retries", default_sms_retries())?
            .set_default("modem.probe_command", default_probe_command())?
            .set_default("modem.text_mode_command", default_text_mode_command())?
            .set_default("modem.compose_command", default_compose_command())?
            .set_default("modem.dial_command", default_dial_command())?
            .set_default("modem.hangup_command", default_hangup_command())?
            .set_default("modem.ok_token", default_ok_token())?
            .set_default("modem.prompt_token", default_prompt_token())?
            .set_default("actuator.gpio", default_actuator_gpio())?
            .set_default("actuator.gpio_root", default_gpio_root())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. COOPGUARD_MODEM__PHONE
            .add_source(
                Environment::with_prefix("COOPGUARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CoopguardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.source.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera source must not be empty".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.max_failures == 0 {
            return Err(ConfigError::Message(
                "Camera max_failures must be greater than 0".to_string(),
            ));
        }

        if self.camera.max_backoff_seconds == 0 {
            return Err(ConfigError::Message(
                "Camera max_backoff_seconds must be greater than 0".to_string(),
            ));
        }

        if self.detector.max_failures == 0 {
            return Err(ConfigError::Message(
                "Detector max_failures must be greater than 0".to_string(),
            ));
        }

        if self.zones.pixel_threshold <= 0.0 || self.zones.velocity_threshold <= 0.0 {
            return Err(ConfigError::Message(
                "Zone pixel and velocity thresholds must be greater than 0".to_string(),
            ));
        }

        if self.tracking.stale_timeout_seconds <= 0.0 {
            return Err(ConfigError::Message(
                "Tracking stale_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.tracking.save_interval_seconds < 0.0 {
            return Err(ConfigError::Message(
                "Tracking save_interval_seconds must not be negative".to_string(),
            ));
        }

        if self.modem.phone.trim().is_empty() {
            return Err(ConfigError::Message(
                "Modem phone number must be set".to_string(),
            ));
        }

        if self.modem.baud == 0 || self.modem.command_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Modem baud and command_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.modem.sms_retries == 0 {
            return Err(ConfigError::Message(
                "Modem sms_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CoopguardConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                source: default_camera_source(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                max_failures: default_camera_max_failures(),
                offline_alert_seconds: default_offline_alert_seconds(),
                max_backoff_seconds: default_max_backoff_seconds(),
                read_timeout_ms: default_read_timeout_ms(),
            },
            detector: DetectorConfig {
                results_path: default_results_path(),
                max_failures: default_detector_max_failures(),
                inference_warn_ms: default_inference_warn_ms(),
            },
            zones: ZoneConfig {
                pixel_threshold: default_pixel_threshold(),
                velocity_threshold: default_velocity_threshold(),
                theft_count_threshold: default_theft_count_threshold(),
            },
            tracking: TrackingConfig {
                persist_path: None,
                save_interval_seconds: default_save_interval_seconds(),
                stale_timeout_seconds: default_stale_timeout_seconds(),
            },
            alerts: AlertConfig {
                cooldown_seconds: default_cooldown_seconds(),
                continuous_alarm: false,
                beep_count: default_beep_count(),
                beep_on_ms: default_beep_on_ms(),
                beep_off_ms: default_beep_off_ms(),
                call_on_alert: false,
                call_duration_seconds: default_call_duration_seconds(),
            },
            modem: ModemConfig {
                port: default_modem_port(),
                baud: default_modem_baud(),
                phone: String::new(),
                command_timeout_ms: default_command_timeout_ms(),
                poll_interval_ms: default_poll_interval_ms(),
                retry_pause_ms: default_retry_pause_ms(),
                post_send_pause_ms: default_post_send_pause_ms(),
                sms_retries: default_sms_retries(),
                probe_command: default_probe_command(),
                text_mode_command: default_text_mode_command(),
                compose_command: default_compose_command(),
                dial_command: default_dial_command(),
                hangup_command: default_hangup_command(),
                ok_token: default_ok_token(),
                prompt_token: default_prompt_token(),
            },
            actuator: ActuatorConfig {
                gpio: default_actuator_gpio(),
                gpio_root: default_gpio_root(),
            },
        }
    }
}

// Default value functions
fn default_camera_source() -> String {
    "0".to_string()
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    15
}
fn default_camera_max_failures() -> u32 {
    5
}
fn default_offline_alert_seconds() -> u64 {
    30
}
fn default_max_backoff_seconds() -> u64 {
    60
}
fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_results_path() -> String {
    "/run/coopguard/detections.jsonl".to_string()
}
fn default_detector_max_failures() -> u32 {
    10
}
fn default_inference_warn_ms() -> u64 {
    200
}

fn default_pixel_threshold() -> f64 {
    120.0
}
fn default_velocity_threshold() -> f64 {
    50.0
}
fn default_theft_count_threshold() -> usize {
    2
}

fn default_save_interval_seconds() -> f64 {
    5.0
}
fn default_stale_timeout_seconds() -> f64 {
    60.0
}

fn default_cooldown_seconds() -> u64 {
    60
}
fn default_beep_count() -> u32 {
    3
}
fn default_beep_on_ms() -> u64 {
    200
}
fn default_beep_off_ms() -> u64 {
    200
}
fn default_call_duration_seconds() -> u64 {
    10
}

fn default_modem_port() -> String {
    "/dev/serial0".to_string()
}
fn default_modem_baud() -> u32 {
    9600
}
fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_retry_pause_ms() -> u64 {
    1000
}
fn default_post_send_pause_ms() -> u64 {
    1000
}
fn default_sms_retries() -> u32 {
    3
}
fn default_probe_command() -> String {
    "AT".to_string()
}
fn default_text_mode_command() -> String {
    "AT+CMGF=1".to_string()
}
fn default_compose_command() -> String {
    "AT+CMGS".to_string()
}
fn default_dial_command() -> String {
    "ATD".to_string()
}
fn default_hangup_command() -> String {
    "ATH".to_string()
}
fn default_ok_token() -> String {
    "OK".to_string()
}
fn default_prompt_token() -> String {
    ">".to_string()
}

fn default_actuator_gpio() -> u32 {
    17
}
fn default_gpio_root() -> String {
    "/sys/class/gpio".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_needs_phone() {
        let config = CoopguardConfig::default();
        assert!(config.validate().is_err());

        let mut config = CoopguardConfig::default();
        config.modem.phone = "+15550100".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = CoopguardConfig::default();
        assert_eq!(config.camera.max_failures, 5);
        assert_eq!(config.camera.offline_alert_seconds, 30);
        assert_eq!(config.camera.max_backoff_seconds, 60);
        assert_eq!(config.zones.pixel_threshold, 120.0);
        assert_eq!(config.zones.theft_count_threshold, 2);
        assert_eq!(config.modem.sms_retries, 3);
        assert_eq!(config.modem.command_timeout(), Duration::from_secs(5));
        assert!(config.tracking.persist_path.is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[zones]
velocity_threshold = 80.0
theft_count_threshold = 3

[tracking]
persist_path = "/tmp/tracks.json"

[alerts]
cooldown_seconds = 10
continuous_alarm = true

[modem]
phone = "+15550100"
"#
        )
        .unwrap();

        let config = CoopguardConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.zones.velocity_threshold, 80.0);
        assert_eq!(config.zones.theft_count_threshold, 3);
        assert_eq!(config.zones.pixel_threshold, 120.0);
        assert_eq!(
            config.tracking.persist_path.as_deref(),
            Some("/tmp/tracks.json")
        );
        assert!(config.alerts.continuous_alarm);
        assert_eq!(config.alerts.cooldown(), Duration::from_secs(10));
        assert_eq!(config.camera.resolution, (640, 480));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_thresholds() {
        let mut config = CoopguardConfig::default();
        config.modem.phone = "+15550100".to_string();
        config.zones.velocity_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = CoopguardConfig::default();
        config.modem.phone = "+15550100".to_string();
        config.modem.sms_retries = 0;
        assert!(config.validate().is_err());
    }
}
