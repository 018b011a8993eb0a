//! Alert fan-out: buzzer-style actuator, GSM modem, and the dispatcher
//! that rate-limits and coordinates them.

pub mod actuator;
pub mod dispatcher;
pub mod gpio;
pub mod modem;
pub mod serial;


pub use actuator::{Actuator, ActuatorState};
pub use dispatcher::{AlertDispatcher, AlertOutcome, AlertRecord};
pub use gpio::{OutputPin, SysfsGpioPin};
pub use modem::{ModemDriver, ModemState};
pub use serial::SerialLink;

#[cfg(unix)]
pub use serial::TtySerialLink;
