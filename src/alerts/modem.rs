use super::serial::SerialLink;
use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Terminates an SMS body; fixed by the modem protocol
const CTRL_Z: u8 = 0x1A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Idle,
    AwaitingResponse,
    Closed,
}

/// Command/response driver for an AT-command GSM modem
pub struct ModemDriver {
    link: Box<dyn SerialLink>,
    config: ModemConfig,
    state: ModemState,
}

impl ModemDriver {
    /// Open the configured serial port. An open failure is fatal to the caller.
    #[cfg(unix)]
    pub async fn open(config: ModemConfig) -> Result<Self> {
        let link = super::serial::TtySerialLink::open(&config.port, config.baud)?;
        Ok(Self::with_link(Box::new(link), config).await)
    }

    #[cfg(not(unix))]
    pub async fn open(config: ModemConfig) -> Result<Self> {
        Err(ModemError::OpenFailed {
            port: config.port,
            details: "serial ports are only supported on unix".to_string(),
        }
        .into())
    }

    /// Wrap an already open link and run the probe sequence.
    /// Probe failures are logged; the driver is returned either way.
    pub async fn with_link(link: Box<dyn SerialLink>, config: ModemConfig) -> Self {
        let mut driver = Self {
            link,
            config,
            state: ModemState::Idle,
        };

        info!("Modem initialized on {}", driver.config.port);

        let probe = driver.config.probe_command.clone();
        if driver.send_ok(&probe).await.is_err() {
            warn!("Modem not responding to {}", probe);
        }

        let text_mode = driver.config.text_mode_command.clone();
        if driver.send_ok(&text_mode).await.is_err() {
            warn!("Failed to set SMS text mode");
        }

        driver
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    pub fn sms_retries(&self) -> u32 {
        self.config.sms_retries
    }

    /// Issue one command and wait for `expect` to appear in the response.
    /// Input left over from earlier commands is discarded first.
    pub async fn command(
        &mut self,
        cmd: &str,
        expect: &str,
    ) -> std::result::Result<String, ModemError> {
        if self.state == ModemState::Closed {
            return Err(ModemError::WriteFailed {
                details: "modem closed".to_string(),
            });
        }

        self.state = ModemState::AwaitingResponse;
        let result = self.exchange(cmd, expect).await;
        self.state = ModemState::Idle;

        if let Err(e) = &result {
            match e {
                ModemError::Timeout { .. } => warn!("No response for command '{}'", cmd),
                _ => error!("Error sending command '{}': {}", cmd, e),
            }
        }
        result
    }

    /// Send `message` to the configured phone, trying at most `retries` times
    pub async fn send_sms(&mut self, message: &str, retries: u32) -> bool {
        let compose = format!(
            "{}=\"{}\"",
            self.config.compose_command, self.config.phone
        );
        let prompt = self.config.prompt_token.clone();

        for attempt in 1..=retries {
            if self.command(&compose, &prompt).await.is_ok() {
                let mut body: Vec<u8> = message.bytes().filter(|&b| b != CTRL_Z).collect();
                body.push(CTRL_Z);

                match self.link.write_all(&body) {
                    Ok(()) => {
                        info!("SMS sent on attempt {}", attempt);
                        sleep(self.config.post_send_pause()).await;
                        return true;
                    }
                    Err(e) => warn!("SMS attempt {} failed writing body: {}", attempt, e),
                }
            } else {
                warn!("SMS attempt {} failed", attempt);
            }

            if attempt < retries {
                sleep(self.config.retry_pause()).await;
            }
        }

        error!("All SMS attempts failed");
        false
    }

    /// Dial the configured phone, hold for `duration`, then hang up
    pub async fn make_call(&mut self, duration: Duration) -> bool {
        let dial = format!("{}{};", self.config.dial_command, self.config.phone);

        if self.send_ok(&dial).await.is_err() {
            error!("Failed to start call");
            return false;
        }

        info!("Call started");
        sleep(duration).await;

        let hangup = self.config.hangup_command.clone();
        if self.send_ok(&hangup).await.is_err() {
            warn!("Hang-up was not acknowledged");
        }
        info!("Call ended");
        true
    }

    pub fn close(&mut self) {
        if self.state != ModemState::Closed {
            self.link.close();
            self.state = ModemState::Closed;
            info!("Modem serial port closed");
        }
    }

    async fn send_ok(&mut self, cmd: &str) -> std::result::Result<String, ModemError> {
        let ok = self.config.ok_token.clone();
        self.command(cmd, &ok).await
    }

    async fn exchange(
        &mut self,
        cmd: &str,
        expect: &str,
    ) -> std::result::Result<String, ModemError> {
        self.link.clear_input()?;
        self.link.write_all(format!("{}\r\n", cmd).as_bytes())?;

        let timeout = self.config.command_timeout();
        let deadline = Instant::now() + timeout;
        let mut response = String::new();

        while Instant::now() < deadline {
            let chunk = self.link.read_available()?;
            if !chunk.is_empty() {
                response.push_str(&String::from_utf8_lossy(&chunk));
                if response.contains(expect) {
                    debug!("'{}' -> {:?}", cmd, response.trim());
                    return Ok(response);
                }
            }
            sleep(self.config.poll_interval()).await;
        }

        Err(ModemError::Timeout {
            command: cmd.to_string(),
            expected: expect.to_string(),
            timeout,
        })
    }
}

impl Drop for ModemDriver {
    fn drop(&mut self) {
        self.close();
    }
}
