//! Driver configuration parameters
//!
//! Every timeout and interval the driver uses. Values can be loaded from a
//! JSON document at build/provisioning time, or from a compact postcard
//! blob kept in flash.

use heapless::String;
use serde::{Deserialize, Serialize};

/// How MQTT messages are delivered by the module.
///
/// Fixed once per client at [`crate::Modem::mqtt_setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MqttRecvMode {
    /// `recv/mode` 1,1: the URC only names the client and buffer channel;
    /// payloads are fetched on demand with `AT+QMTRECV=<c>,<ch>`.
    Compact,
    /// `recv/mode` 0,0: topic and payload arrive inline in the URC.
    Verbose,
}

impl MqttRecvMode {
    /// `<msg_recv_mode>,<msg_len_enable>` pair for `AT+QMTCFG="recv/mode"`.
    pub const fn wire_flags(self) -> (u8, u8) {
        match self {
            Self::Compact => (1, 1),
            Self::Verbose => (0, 0),
        }
    }
}

/// Core driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModemConfig {
    // --- Transaction engine ---
    /// Sleep between polls of the serial port while waiting (ms)
    pub poll_interval_ms: u32,
    /// Default command timeout (ms)
    pub command_timeout_ms: u32,
    /// Timeout for short identity/status queries (ms)
    pub query_timeout_ms: u32,

    // --- Boot ---
    /// How long to hold PWRKEY high (ms)
    pub pwrkey_pulse_ms: u32,
    /// Wait for each of the `RDY` / `APP RDY` banners (ms)
    pub boot_banner_timeout_ms: u32,
    /// Settle time after the first identity query during configure (ms)
    pub configure_settle_ms: u32,

    // --- Sockets ---
    pub socket_open_timeout_ms: u32,
    pub socket_close_timeout_ms: u32,
    pub socket_send_timeout_ms: u32,
    /// Timeout for a single `AT+QIRD` / `AT+QSSLRECV` drain (ms)
    pub drain_timeout_ms: u32,

    // --- PDP contexts ---
    pub pdp_activate_timeout_ms: u32,
    /// First back-off delay recorded after a failed activation (ms)
    pub pdp_retry_base_ms: u32,

    // --- MQTT ---
    pub mqtt_recv_mode: MqttRecvMode,
    pub mqtt_keepalive_secs: u16,
    /// Grace period for reassembling payloads split by line terminators (ms)
    pub mqtt_payload_grace_ms: u32,
    /// Interval for polling every compact-mode buffer channel (ms)
    pub mqtt_buffer_poll_ms: u32,
    pub mqtt_open_timeout_ms: u32,
    pub mqtt_connect_timeout_ms: u32,
    pub mqtt_subscribe_timeout_ms: u32,
    pub mqtt_publish_timeout_ms: u32,

    // --- HTTP ---
    /// Seconds the module waits for the URL upload after `CONNECT`
    pub http_url_input_secs: u16,
    /// `AT+QHTTPGET` response timeout (s)
    pub http_get_secs: u16,
    /// `AT+QHTTPREADFILE` timeout (s)
    pub http_readfile_secs: u16,

    // --- Maintenance ---
    /// Interval for registration / context / signal refresh (ms)
    pub maintenance_interval_ms: u32,
    /// How long a successful `AT` readiness probe is trusted (ms)
    pub ready_cache_ms: u32,
    /// How long an `AT+QCSQ` reading is trusted (ms)
    pub rssi_cache_ms: u32,
    /// NTP server used for the periodic time sync
    pub ntp_server: String<64>,
    pub ntp_port: u16,
    /// Interval between NTP syncs (ms); 0 disables them
    pub ntp_interval_ms: u32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        let mut ntp_server = String::new();
        // Fits: 12 bytes into a 64-byte buffer.
        let _ = ntp_server.push_str("pool.ntp.org");

        Self {
            // Transaction engine
            poll_interval_ms: 10,
            command_timeout_ms: 5_000,
            query_timeout_ms: 300,

            // Boot
            pwrkey_pulse_ms: 2_000,
            boot_banner_timeout_ms: 10_000,
            configure_settle_ms: 5_000,

            // Sockets
            socket_open_timeout_ms: 10_000,
            socket_close_timeout_ms: 10_000,
            socket_send_timeout_ms: 10_000,
            drain_timeout_ms: 100,

            // PDP
            pdp_activate_timeout_ms: 30_000,
            pdp_retry_base_ms: 30_000,

            // MQTT
            mqtt_recv_mode: MqttRecvMode::Compact,
            mqtt_keepalive_secs: 300,
            mqtt_payload_grace_ms: 300,
            mqtt_buffer_poll_ms: 60_000,
            mqtt_open_timeout_ms: 5_000,
            mqtt_connect_timeout_ms: 5_000,
            mqtt_subscribe_timeout_ms: 18_000,
            mqtt_publish_timeout_ms: 15_000,

            // HTTP
            http_url_input_secs: 5,
            http_get_secs: 120,
            http_readfile_secs: 300,

            // Maintenance
            maintenance_interval_ms: 30_000,
            ready_cache_ms: 2_000,
            rssi_cache_ms: 5_000,
            ntp_server,
            ntp_port: 123,
            ntp_interval_ms: 3_600_000, // hourly
        }
    }
}

/// Errors from loading or validating a [`ModemConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored blob or JSON document failed to deserialize.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// The backing store could not be read or written.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "config storage I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::IoError => Self::Config("storage I/O error"),
        }
    }
}

impl ModemConfig {
    /// Reject values that would make the driver spin or never time out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1_000 {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be within 1..=1000",
            ));
        }
        if self.command_timeout_ms < self.poll_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "command_timeout_ms must exceed poll_interval_ms",
            ));
        }
        if self.drain_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("drain_timeout_ms must be > 0"));
        }
        if self.pdp_retry_base_ms == 0 || self.pdp_retry_base_ms > crate::registry::MAX_RETRY_DELAY_MS {
            return Err(ConfigError::ValidationFailed(
                "pdp_retry_base_ms must be within 1..=21600000",
            ));
        }
        if self.mqtt_keepalive_secs > 3_600 {
            return Err(ConfigError::ValidationFailed(
                "mqtt_keepalive_secs must be <= 3600",
            ));
        }
        if self.http_get_secs == 0 || self.http_readfile_secs == 0 || self.http_url_input_secs == 0 {
            return Err(ConfigError::ValidationFailed("http timeouts must be > 0"));
        }
        if self.ntp_interval_ms != 0 && self.ntp_server.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "ntp_server required when ntp_interval_ms is set",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a compact blob for flash storage.
    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Restore from a blob produced by [`Self::to_blob`].
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }
}
