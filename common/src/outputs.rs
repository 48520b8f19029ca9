use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::{error::OutputError, types::FanLevel};

/// The mutually exclusive relay lines, one per speed level.
pub trait SpeedOutputs: Send {
    fn write_line(&mut self, level: FanLevel, asserted: bool) -> Result<(), OutputError>;
}

pub trait StatusLed: Send {
    fn set_lit(&mut self, lit: bool) -> Result<(), OutputError>;
}

/// Cloneable access to the single status LED.
///
/// The controller and the blink worker both drive the same pin, so the LED
/// sits behind a mutex and every clone talks to the same device.
#[derive(Clone)]
pub struct LedHandle {
    led: Arc<Mutex<Box<dyn StatusLed>>>,
}

impl LedHandle {
    pub fn new<L: StatusLed + 'static>(led: L) -> Self {
        Self {
            led: Arc::new(Mutex::new(Box::new(led))),
        }
    }

    pub fn on(&self) {
        self.set(true);
    }

    pub fn off(&self) {
        self.set(false);
    }

    fn set(&self, lit: bool) {
        let mut led = self.led.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = led.set_lit(lit) {
            warn!("failed to drive status LED: {err}");
        }
    }
}
