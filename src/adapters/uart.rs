//! UART adapter for the module's AT port.
//!
//! Wraps an ESP-IDF [`UartDriver`] as a [`SerialPort`]. Reads never block:
//! the driver's own RX ring buffer holds bytes between polls.

#![cfg(target_os = "espidf")]

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::gpio::{InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{self, Uart, UartDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_sys::EspError;
use log::info;

use crate::app::ports::SerialPort;

/// Factory default baud rate of the BG95/BG96 main UART.
pub const DEFAULT_BAUD: u32 = 115_200;

/// The module's main UART.
pub struct UartSerial<'d> {
    driver: UartDriver<'d>,
}

impl<'d> UartSerial<'d> {
    /// Install the UART driver on `tx`/`rx` with 8N1 at `baud`.
    pub fn new<U: Uart>(
        uart: impl Peripheral<P = U> + 'd,
        tx: impl Peripheral<P = impl OutputPin> + 'd,
        rx: impl Peripheral<P = impl InputPin> + 'd,
        baud: u32,
    ) -> Result<Self, EspError> {
        let config = uart::config::Config::new().baudrate(Hertz(baud));
        let driver = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<esp_idf_hal::gpio::AnyIOPin>::None,
            Option::<esp_idf_hal::gpio::AnyIOPin>::None,
            &config,
        )?;
        info!("modem UART up at {} baud", baud);
        Ok(Self { driver })
    }
}

impl SerialPort for UartSerial<'_> {
    type Error = EspError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.driver.read(buf, NON_BLOCK)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        self.driver.write(data)
    }

    fn flush(&mut self) -> Result<(), EspError> {
        self.driver.wait_tx_done(esp_idf_hal::delay::BLOCK)
    }

    fn available(&self) -> bool {
        self.driver.remaining_read().is_ok_and(|n| n > 0)
    }
}
