//! BGxx modem firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                   │
//! │  UartSerial (SerialPort)  SystemClock (Clock)            │
//! │  PwrKey (PowerKey)        ConfigStore (NVS)              │
//! │                                                          │
//! │  ─────────────── Port Trait Boundary ───────────────     │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  Modem (engine · dispatch · registry)              │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  ModemActor on the `modem` thread ⇄ request/event channels│
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::Result;
use esp_idf_hal::delay::{Delay, FreeRtos};
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use heapless::String;
use log::{info, warn};

use bgxx::actor::{ModemActor, channels, runner};
use bgxx::adapters::nvs::ConfigStore;
use bgxx::adapters::time::SystemClock;
use bgxx::adapters::uart::{DEFAULT_BAUD, UartSerial};
use bgxx::app::commands::ModemRequest;
use bgxx::app::events::ModemEvent;
use bgxx::config::ModemConfig;
use bgxx::drivers::pwrkey::PwrKey;
use bgxx::modem::{ErrorFormat, RadioMode};
use bgxx::Modem;

/// Carrier APN for the data context.
const APN: &str = "internet";
/// Data context id.
const DATA_CID: u8 = 1;
/// Actor tick: URC service, socket drains, maintenance.
const POLL_PERIOD: Duration = Duration::from_millis(100);

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BGxx modem v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match ConfigStore::new().and_then(|store| store.load()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config load failed ({}), using defaults", e);
            ModemConfig::default()
        }
    };

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let serial = UartSerial::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        DEFAULT_BAUD,
    )?;
    let mut pwrkey = PwrKey::new(PinDriver::output(peripherals.pins.gpio16)?, Delay::new_default());

    // ── 4. Bring the module up ────────────────────────────────
    let mut modem = Modem::new(serial, SystemClock::new(), config)?;
    modem.init(&mut pwrkey)?;
    modem.set_error_message_format(ErrorFormat::Numeric)?;
    modem.configure_radio_mode(RadioMode::Auto, None, false)?;
    modem.http_config(DATA_CID)?;
    info!("modem IMEI {} ICCID {}", modem.imei(), modem.ccid());

    // ── 5. Hand the modem to its thread ───────────────────────
    let actor = ModemActor::new(modem, channels::publish_event)?;
    let _modem_thread = runner::spawn(actor, POLL_PERIOD)?;

    let mut apn = String::new();
    if apn.push_str(APN).is_err() {
        anyhow::bail!("APN too long");
    }
    channels::send_request(ModemRequest::OpenContext { cid: DATA_CID, apn });

    // ── 6. Event loop ─────────────────────────────────────────
    loop {
        while let Some(event) = channels::try_recv_event() {
            match event {
                ModemEvent::Completed { request, result } => {
                    info!("{:?}: {:?}", request, result);
                }
                ModemEvent::SocketData { id, data } => {
                    info!("socket {}: {} bytes", id, data.len());
                }
                ModemEvent::MqttMessage { client, topic, payload } => {
                    info!("mqtt {} {}: {} bytes", client, topic, payload.len());
                }
                ModemEvent::Sms(sms) => info!("sms from {}: {}", sms.origin, sms.text),
                other => info!("{:?}", other),
            }
        }
        FreeRtos::delay_ms(100);
    }
}
