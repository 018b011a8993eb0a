use super::runtime::request_shutdown;
use crate::alerts::AlertDispatcher;
use crate::error::{CoopguardError, Result};
use crate::events::EventBus;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the monitor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    StopAlarm,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') => Some(KeyAction::StopAlarm),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

/// Operator console: `s` silences the alarm, `q` quits
pub struct KeyboardInputHandler {
    dispatcher: Arc<AlertDispatcher>,
    event_bus: EventBus,
    shutdown_token: CancellationToken,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl KeyboardInputHandler {
    pub fn new(
        dispatcher: Arc<AlertDispatcher>,
        event_bus: EventBus,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            event_bus,
            shutdown_token,
            cancellation_token: CancellationToken::new(),
            task: None,
        }
    }

    /// Start listening for key presses on a blocking thread
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(CoopguardError::component(
                "keyboard",
                "keyboard handler already started",
            ));
        }

        info!("Starting keyboard input handler - press 's' to stop the alarm, 'q' to quit");

        let dispatcher = Arc::clone(&self.dispatcher);
        let event_bus = self.event_bus.clone();
        let shutdown_token = self.shutdown_token.clone();
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        self.task = Some(task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() && !shutdown_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key_event = match event::read() {
                            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                                key_event
                            }
                            _ => continue,
                        };

                        match KeyAction::from_key(key_event.code) {
                            Some(KeyAction::StopAlarm) => {
                                info!("Stop key pressed - silencing alarm");
                                let dispatcher = Arc::clone(&dispatcher);
                                runtime_handle.spawn(async move {
                                    dispatcher.stop_continuous_alarm().await;
                                });
                            }
                            Some(KeyAction::Quit) => {
                                info!("Quit key pressed - requesting shutdown");
                                request_shutdown(
                                    &shutdown_token,
                                    &event_bus,
                                    "User requested via keyboard",
                                );
                                break;
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        }));

        Ok(())
    }

    pub async fn stop(&mut self) {
        self.cancellation_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Keyboard task ended abnormally: {}", e);
            }
        }
        let _ = disable_raw_mode();
    }
}
