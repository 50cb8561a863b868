//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter  | Implements   | Connects to              |
//! |----------|--------------|--------------------------|
//! | `time`   | Clock        | ESP32 system timer       |
//! | `uart`   | SerialPort   | ESP-IDF UART driver      |
//! | `nvs`    | config store | NVS / in-memory blob     |

pub mod nvs;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
