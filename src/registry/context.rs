//! PDP context table entry and its back-off schedule.

use heapless::String;
use log::{info, warn};

use super::ids::ContextId;

/// Ceiling for the activation back-off (6 h).
pub const MAX_RETRY_DELAY_MS: u32 = 21_600_000;

/// Next back-off delay after a failed activation.
///
/// `0 → base → 2·base → 4·base …`, saturating at [`MAX_RETRY_DELAY_MS`].
pub fn next_retry_delay(current_ms: u32, base_ms: u32) -> u32 {
    let next = if current_ms == 0 {
        base_ms
    } else {
        current_ms.saturating_mul(2)
    };
    next.min(MAX_RETRY_DELAY_MS)
}

/// One PDP context slot.
#[derive(Debug, Clone, Default)]
pub struct PdpContext {
    apn: String<64>,
    /// Set up by the application (has an APN).
    active: bool,
    /// Attached, as last reported by `+QIACT:`.
    connected: bool,
    retry_delay_ms: u32,
    ip: String<64>,
}

impl PdpContext {
    pub const fn new() -> Self {
        Self {
            apn: String::new(),
            active: false,
            connected: false,
            retry_delay_ms: 0,
            ip: String::new(),
        }
    }

    pub fn apn(&self) -> &str {
        &self.apn
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn retry_delay_ms(&self) -> u32 {
        self.retry_delay_ms
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Record the APN and mark the slot in use. Returns `false` if the
    /// name does not fit.
    pub(crate) fn setup(&mut self, apn: &str) -> bool {
        self.apn.clear();
        if self.apn.push_str(apn).is_err() {
            return false;
        }
        self.active = true;
        true
    }

    /// Advance the back-off after a failed activation.
    pub(crate) fn record_failure(&mut self, base_ms: u32) -> u32 {
        self.retry_delay_ms = next_retry_delay(self.retry_delay_ms, base_ms);
        self.retry_delay_ms
    }

    /// Apply a `+QIACT:` report.
    pub(crate) fn apply_report(&mut self, cid: ContextId, up: bool, ip: Option<&str>) {
        if up {
            if !self.connected {
                info!("context {} connected", cid);
            }
            self.connected = true;
            self.retry_delay_ms = 0;
            if let Some(ip) = ip {
                self.ip.clear();
                if self.ip.push_str(ip).is_err() {
                    warn!("context {} ip does not fit, ignored", cid);
                }
            }
        } else {
            self.mark_down(cid);
        }
    }

    /// Deactivated (report, `pdpdeact`, explicit close).
    pub(crate) fn mark_down(&mut self, cid: ContextId) {
        if self.connected {
            info!("context {} disconnected", cid);
        }
        self.connected = false;
        self.ip.clear();
    }

    /// Module rebooted: keep the APN, forget everything learned from it.
    pub(crate) fn reset_link(&mut self) {
        self.connected = false;
        self.ip.clear();
    }
}
