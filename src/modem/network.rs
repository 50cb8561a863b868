//! Module lifecycle, radio configuration, PDP contexts and status.

use heapless::String;
use log::{debug, error, info, warn};

use super::Modem;
use crate::app::ports::{Clock, PowerKey, SerialPort};
use crate::at::RegDomain;
use crate::at::fields::{self, num, unquote};
use crate::at::urc::RegistrationStatus;
use crate::error::{AtError, ContextError, Error, Result};
use crate::registry::{ContextId, MqttClientId, SocketId, tls_profile};

/// `AT+COPS` can scan for minutes.
const OPERATOR_SELECT_TIMEOUT_MS: u32 = 180_000;
const RADIO_OFF_TIMEOUT_MS: u32 = 15_000;
const REGISTRATION_QUERY_TIMEOUT_MS: u32 = 3_000;
const CONTEXT_QUERY_TIMEOUT_MS: u32 = 15_000;
const CONTEXT_DEACTIVATE_TIMEOUT_MS: u32 = 40_000;
const NTP_TIMEOUT_MS: u32 = 60_000;

/// Access technology reported by `AT+QCSQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Technology {
    NoService,
    Gsm,
    EMtc,
    NbIot,
    #[default]
    Unknown,
}

impl Technology {
    fn from_name(name: &str) -> Self {
        match name {
            "NOSERVICE" => Self::NoService,
            "GSM" => Self::Gsm,
            "eMTC" => Self::EMtc,
            "NBIoT" => Self::NbIot,
            _ => Self::Unknown,
        }
    }
}

/// Radio access selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Gsm,
    NbIot,
    CatM1,
    Auto,
}

impl RadioMode {
    /// `<AcT>` for `AT+COPS`; `None` lets the module pick.
    const fn access_technology(self) -> Option<u8> {
        match self {
            Self::Gsm => Some(0),
            Self::CatM1 => Some(8),
            Self::NbIot => Some(9),
            Self::Auto => None,
        }
    }
}

/// `AT+CMEE` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    Disabled,
    Numeric,
    Verbose,
}

impl<S: SerialPort, C: Clock> Modem<S, C> {
    // ───────────────────────────────────────────────────────────────
    // Boot and base configuration
    // ───────────────────────────────────────────────────────────────

    /// Pulse PWRKEY and wait for the boot banners. One retry.
    pub fn power_cycle(&mut self, key: &mut impl PowerKey) -> Result<()> {
        let banner_ms = self.config.boot_banner_timeout_ms;
        for attempt in 1..=2 {
            info!("power cycling module (attempt {})", attempt);
            key.pulse(self.config.pwrkey_pulse_ms);
            self.reader.discard_partial();

            if let Err(e) = self.wait_for("RDY", banner_ms) {
                warn!("no RDY banner: {}", e);
                continue;
            }
            self.forget_module_state();
            match self.wait_for("APP RDY", banner_ms) {
                Ok(_) => {
                    info!("module ready");
                    return Ok(());
                }
                Err(e) => warn!("no APP RDY banner: {}", e),
            }
        }
        error!("module did not boot");
        Err(Error::Init("module did not boot"))
    }

    /// Power cycle, then [`Self::configure`].
    pub fn init(&mut self, key: &mut impl PowerKey) -> Result<()> {
        self.power_cycle(key)?;
        self.configure()
    }

    /// Base configuration: echo off, registration reports, character set,
    /// SMS text mode. Reads IMEI, CCID and IMSI; fails without a SIM.
    pub fn configure(&mut self) -> Result<()> {
        let cmd_ms = self.config.command_timeout_ms;

        self.check("ATE0", "OK", cmd_ms)?;
        self.check("AT+CREG=2", "OK", cmd_ms)?;
        if let Some(imei) = self.exec("AT+CGSN", cmd_ms)?.first() {
            copy_into(&mut self.identity.imei, imei.trim());
        }
        self.clock.delay_ms(self.config.configure_settle_ms);
        self.check("AT+CSCS=\"IRA\"", "OK", cmd_ms)?;
        self.check("AT+CMGF=1", "OK", cmd_ms)?;

        let ccid = self.query("AT+QCCID", "+QCCID: ", cmd_ms)?;
        if ccid.trim().is_empty() {
            error!("no SIM card detected");
            return Err(Error::Init("no SIM card"));
        }
        copy_into(&mut self.identity.ccid, ccid.trim());

        if let Some(imsi) = self.exec("AT+CIMI", cmd_ms)?.first() {
            copy_into(&mut self.identity.imsi, imsi.trim());
        }
        info!(
            "imei {} ccid {} imsi {}",
            self.identity.imei, self.identity.ccid, self.identity.imsi
        );
        Ok(())
    }

    /// Select the radio access technology. With an operator code the
    /// module is pointed at that network (`force` skips automatic
    /// fallback); without one the scan configuration is changed instead.
    pub fn configure_radio_mode(
        &mut self,
        mode: RadioMode,
        operator: Option<u32>,
        force: bool,
    ) -> Result<()> {
        let cmd_ms = self.config.command_timeout_ms;
        if let Some(op) = operator {
            let selection = if force { 1 } else { 4 };
            let cmd = match mode.access_technology() {
                Some(act) => format!("AT+COPS={},2,\"{}\",{}", selection, op, act),
                None => format!("AT+COPS={},2,\"{}\"", selection, op),
            };
            return self.check(&cmd, "OK", OPERATOR_SELECT_TIMEOUT_MS);
        }

        let (iot_mode, scan_mode) = match mode {
            RadioMode::Gsm => (None, 1),
            RadioMode::NbIot => (Some(1), 0),
            RadioMode::CatM1 => (Some(0), 0),
            RadioMode::Auto => (Some(2), 0),
        };
        if let Some(iot) = iot_mode {
            self.check(&format!("AT+QCFG=\"iotopmode\",{},1", iot), "OK", cmd_ms)?;
        }
        self.check(&format!("AT+QCFG=\"nwscanmode\",{},1", scan_mode), "OK", cmd_ms)
    }

    pub fn set_error_message_format(&mut self, format: ErrorFormat) -> Result<()> {
        let n = match format {
            ErrorFormat::Disabled => 0,
            ErrorFormat::Numeric => 1,
            ErrorFormat::Verbose => 2,
        };
        let timeout = self.config.command_timeout_ms;
        self.check(&format!("AT+CMEE={}", n), "OK", timeout)
    }

    /// TLS 1.2 with SNI, all cipher suites, CA certificate `cacert.pem`.
    pub fn set_tls_profile(&mut self, profile: u8) -> Result<()> {
        let p = tls_profile(profile)?;
        let timeout = self.config.command_timeout_ms;
        for setting in [
            format!("AT+QSSLCFG=\"sslversion\",{},4", p),
            format!("AT+QSSLCFG=\"ciphersuite\",{},0XFFFF", p),
            format!("AT+QSSLCFG=\"seclevel\",{},0", p),
            format!("AT+QSSLCFG=\"sni\",{},1", p),
            format!("AT+QSSLCFG=\"cacert\",{},\"cacert.pem\"", p),
        ] {
            self.check(&setting, "OK", timeout)?;
        }
        Ok(())
    }

    /// Whether the module answers `AT`. A success is trusted for
    /// `ready_cache_ms`.
    pub fn ready(&mut self) -> bool {
        let now = self.now_ms();
        if let Some(at) = self.ready_at {
            if now < at + u64::from(self.config.ready_cache_ms) {
                return true;
            }
        }
        let timeout = self.config.query_timeout_ms;
        match self.check("AT", "OK", timeout) {
            Ok(()) => {
                self.ready_at = Some(self.now_ms());
                true
            }
            Err(_) => {
                self.ready_at = None;
                false
            }
        }
    }

    /// `AT+CFUN=0`. All connections are gone afterwards.
    pub fn radio_off(&mut self) -> Result<()> {
        self.check("AT+CFUN=0", "OK", RADIO_OFF_TIMEOUT_MS)?;
        self.forget_module_state();
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Identity and signal
    // ───────────────────────────────────────────────────────────────

    pub fn imei(&self) -> &str {
        &self.identity.imei
    }

    pub fn ccid(&self) -> &str {
        &self.identity.ccid
    }

    pub fn imsi(&self) -> &str {
        &self.identity.imsi
    }

    /// Signal strength in dBm from `AT+QCSQ`, cached for `rssi_cache_ms`.
    pub fn rssi(&mut self) -> Result<i16> {
        let now = self.now_ms();
        if let Some(at) = self.signal.read_at {
            if now < at + u64::from(self.config.rssi_cache_ms) {
                return Ok(self.signal.rssi);
            }
        }
        let timeout = self.config.query_timeout_ms;
        let reply = self.query_critical("AT+QCSQ", "+QCSQ: ", timeout)?;
        let mut f = fields::split(&reply);
        let technology = Technology::from_name(unquote(f.next().unwrap_or_default()));
        let rssi = f.next().and_then(num).unwrap_or(0);
        if technology != self.signal.technology {
            info!("access technology {:?}", technology);
        }
        self.signal.technology = technology;
        self.signal.rssi = rssi;
        self.signal.read_at = Some(self.now_ms());
        Ok(rssi)
    }

    /// Technology seen by the last [`Self::rssi`] query.
    pub fn technology(&self) -> Technology {
        self.signal.technology
    }

    pub fn registration(&self, domain: RegDomain) -> RegistrationStatus {
        self.registry.registration(domain)
    }

    // ───────────────────────────────────────────────────────────────
    // PDP contexts
    // ───────────────────────────────────────────────────────────────

    /// Configure context `cid` with an APN.
    pub fn setup_context(&mut self, cid: u8, apn: &str) -> Result<()> {
        let id = ContextId::try_from(cid)?;
        if !self.registry.context_mut(id).setup(apn) {
            return Err(Error::Config("apn too long"));
        }
        let timeout = self.config.command_timeout_ms;
        self.check(&format!("AT+QICSGP={},1,\"{}\",\"\",\"\",0", id, apn), "OK", timeout)
    }

    /// Activate context `cid`. A failure advances the back-off recorded on
    /// the context; scheduling the retry is up to the caller.
    pub fn open_pdp_context(&mut self, cid: u8) -> Result<()> {
        let id = ContextId::try_from(cid)?;
        if self.registry.context(id).is_connected() {
            return Ok(());
        }
        if self.signal.technology == Technology::NoService {
            warn!("context {}: no service", id);
            return Err(ContextError::NoService.into());
        }

        let timeout = self.config.pdp_activate_timeout_ms;
        match self.check(&format!("AT+QIACT={}", id), "OK", timeout) {
            Ok(()) => {
                // The activation answer carries no state; the report does.
                if let Err(e) = self.exec("AT+QIACT?", CONTEXT_QUERY_TIMEOUT_MS) {
                    warn!("context {} state query failed: {}", id, e);
                }
                if self.registry.context(id).is_connected() {
                    Ok(())
                } else {
                    self.activation_failed(id, &Error::Context(ContextError::NotConnected));
                    Err(ContextError::NotConnected.into())
                }
            }
            Err(e) => {
                self.activation_failed(id, &e);
                Err(ContextError::ActivationFailed.into())
            }
        }
    }

    /// Advance the back-off and tear down whatever the module half set up.
    fn activation_failed(&mut self, id: ContextId, cause: &Error) {
        let base = self.config.pdp_retry_base_ms;
        let delay = self.registry.context_mut(id).record_failure(base);
        warn!("context {} activation failed: {}, retry in {} ms", id, cause, delay);
        let deact = format!("AT+QIDEACT={}", id);
        if let Err(e) = self.check(&deact, "OK", CONTEXT_DEACTIVATE_TIMEOUT_MS) {
            debug!("context {} deactivate after failure: {}", id, e);
        }
    }

    pub fn close_pdp_context(&mut self, cid: u8) -> Result<()> {
        let id = ContextId::try_from(cid)?;
        self.check(&format!("AT+QIDEACT={}", id), "OK", CONTEXT_DEACTIVATE_TIMEOUT_MS)?;
        self.registry.context_mut(id).mark_down(id);
        Ok(())
    }

    pub fn context_connected(&self, cid: u8) -> bool {
        ContextId::new(cid).is_some_and(|id| self.registry.context(id).is_connected())
    }

    pub fn context_ip(&self, cid: u8) -> Option<&str> {
        let id = ContextId::new(cid)?;
        let ip = self.registry.context(id).ip();
        (!ip.is_empty()).then_some(ip)
    }

    /// Back-off recorded by the last failed [`Self::open_pdp_context`].
    pub fn context_retry_delay(&self, cid: u8) -> u32 {
        ContextId::new(cid).map_or(0, |id| self.registry.context(id).retry_delay_ms())
    }

    /// Ask the module for the context address (`AT+CGPADDR`).
    pub fn query_ip(&mut self, cid: u8) -> Result<String<64>> {
        let id = ContextId::try_from(cid)?;
        let timeout = self.config.command_timeout_ms;
        let prefix = format!("+CGPADDR: {},", id);
        let reply = self.query_critical(&format!("AT+CGPADDR={}", id), &prefix, timeout)?;
        let mut ip = String::new();
        ip.push_str(unquote(reply.trim()))
            .map_err(|_| Error::At(AtError::Unexpected))?;
        Ok(ip)
    }

    /// Raw `AT+QISTATE=0,<cid>` listing for every socket on a context.
    pub fn context_sockets_state(&mut self, cid: u8) -> Result<std::vec::Vec<std::string::String>> {
        let id = ContextId::try_from(cid)?;
        let timeout = self.config.command_timeout_ms;
        self.exec(&format!("AT+QISTATE=0,{}", id), timeout)
    }

    // ───────────────────────────────────────────────────────────────
    // Maintenance
    // ───────────────────────────────────────────────────────────────

    /// Re-read registration, context state and signal. The answers land in
    /// the registry through the dispatcher.
    pub fn refresh_network_state(&mut self) -> Result<()> {
        self.exec("AT+CREG?", REGISTRATION_QUERY_TIMEOUT_MS)?;
        self.exec("AT+QIACT?", CONTEXT_QUERY_TIMEOUT_MS)?;
        self.signal.read_at = None;
        self.rssi().map(|_| ())
    }

    /// Periodic upkeep run from [`Self::poll`]. Failures are logged only.
    pub(crate) fn maintenance(&mut self) {
        if let Err(e) = self.refresh_network_state() {
            warn!("network refresh failed: {}", e);
        }
        if let Err(e) = self.mqtt_check_connection() {
            warn!("mqtt connection check failed: {}", e);
        }
        let now = self.now_ms();
        if self.config.ntp_interval_ms != 0 && now >= self.next_ntp_at && self.context_connected(1) {
            self.next_ntp_at = now + u64::from(self.config.ntp_interval_ms);
            if let Err(e) = self.ntp_sync() {
                warn!("ntp sync failed: {}", e);
            }
        }
    }

    /// Trigger an NTP sync on context 1 and return the reported time.
    pub fn ntp_sync(&mut self) -> Result<std::string::String> {
        let cmd = format!(
            "AT+QNTP=1,\"{}\",{}",
            self.config.ntp_server, self.config.ntp_port
        );
        let time = self.query_marker_critical(&cmd, "+QNTP: ", NTP_TIMEOUT_MS)?;
        info!("ntp: {}", time);
        Ok(time)
    }

    /// Log a summary of every tracked connection.
    pub fn log_status(&self) {
        info!(
            "technology {:?}, rssi {} dBm, {} {}",
            self.signal.technology,
            self.signal.rssi,
            RegDomain::Cs.label(),
            self.registry.registration(RegDomain::Cs)
        );
        for id in ContextId::all() {
            let ctx = self.registry.context(id);
            if ctx.is_active() {
                info!(
                    "context {} apn {} connected {} ip {} retry {} ms",
                    id,
                    ctx.apn(),
                    ctx.is_connected(),
                    ctx.ip(),
                    ctx.retry_delay_ms()
                );
            }
        }
        for id in SocketId::all() {
            let s = self.registry.socket(id);
            if let Some(ep) = s.endpoint() {
                info!(
                    "socket {} {}:{} {:?} connected {} buffered {}",
                    id,
                    ep.host,
                    ep.port,
                    s.state(),
                    s.is_connected(),
                    s.buffer().len()
                );
            }
        }
        for id in MqttClientId::all() {
            let m = self.registry.session(id);
            if m.is_configured() {
                info!("mqtt {} {}:{} {:?}", id, m.host(), m.port(), m.state());
            }
        }
    }
}

/// Copy as much of `src` as fits.
pub(crate) fn copy_into<const N: usize>(dst: &mut String<N>, src: &str) {
    dst.clear();
    for c in src.chars() {
        if dst.push(c).is_err() {
            break;
        }
    }
}
