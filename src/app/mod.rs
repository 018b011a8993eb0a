pub mod keyboard;

mod monitor;
mod runtime;
mod shutdown;
mod startup;


pub use keyboard::{KeyAction, KeyboardInputHandler};
pub use monitor::{Monitor, StepOutcome, CAMERA_OFFLINE_MESSAGE, THEFT_MESSAGE};
pub use runtime::install_signal_handlers;
