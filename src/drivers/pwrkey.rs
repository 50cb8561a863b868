//! PWRKEY line driver.
//!
//! The BG95 toggles power on a high pulse of at least 500 ms on PWRKEY (through
//! the usual open-collector inverter on the carrier board). Generic over
//! `embedded-hal` so the same driver runs on an ESP-IDF `PinDriver` and
//! on a host mock.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::PowerKey;

pub struct PwrKey<P, D> {
    pin: P,
    delay: D,
}

impl<P: OutputPin, D: DelayNs> PwrKey<P, D> {
    /// Take `pin` and leave it released.
    pub fn new(mut pin: P, delay: D) -> Self {
        if pin.set_low().is_err() {
            warn!("PWRKEY: initial release failed");
        }
        Self { pin, delay }
    }

    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}

impl<P: OutputPin, D: DelayNs> PowerKey for PwrKey<P, D> {
    fn pulse(&mut self, hold_ms: u32) {
        debug!("PWRKEY: pulse {} ms", hold_ms);
        if self.pin.set_high().is_err() {
            warn!("PWRKEY: drive failed");
            return;
        }
        self.delay.delay_ms(hold_ms);
        if self.pin.set_low().is_err() {
            warn!("PWRKEY: release failed");
        }
    }
}
