//! Scripted module for integration tests.
//!
//! The serial port and the clock share one state. Every byte the driver
//! writes is logged; when the written stream ends with the next scripted
//! trigger, that step's reply is queued for reading. Unsolicited lines can
//! be pushed at any time or scheduled for a virtual instant. The clock
//! only advances inside `delay_ms`, so timeouts cost no real time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bgxx::Modem;
use bgxx::app::ports::{Clock, DownloadObserver, PowerKey, SerialPort};
use bgxx::config::ModemConfig;
use std::sync::{Arc, Mutex};

struct Step {
    on: Vec<u8>,
    reply: Vec<u8>,
}

#[derive(Default)]
struct State {
    now_ms: u64,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    unmatched: Vec<u8>,
    steps: VecDeque<Step>,
    timed: Vec<(u64, Vec<u8>)>,
    trickle_ms: Option<u64>,
}

impl State {
    fn release_due(&mut self) {
        let now = self.now_ms;
        let mut i = 0;
        while i < self.timed.len() {
            if self.timed[i].0 <= now {
                let (_, bytes) = self.timed.remove(i);
                self.rx.extend(bytes);
            } else {
                i += 1;
            }
        }
    }
}

/// Handle for scripting and inspecting the fake module.
#[derive(Clone, Default)]
pub struct Script(Rc<RefCell<State>>);

#[allow(dead_code)]
impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the driver sends `cmd` (plus `\r\n`), answer with `reply`.
    pub fn on(&self, cmd: &str, reply: &str) -> &Self {
        let mut on = cmd.as_bytes().to_vec();
        on.extend_from_slice(b"\r\n");
        self.on_raw(&on, reply.as_bytes())
    }

    /// When the driver writes exactly `bytes` (a payload after a prompt),
    /// answer with `reply`.
    pub fn on_raw(&self, bytes: &[u8], reply: &[u8]) -> &Self {
        self.0.borrow_mut().steps.push_back(Step {
            on: bytes.to_vec(),
            reply: reply.to_vec(),
        });
        self
    }

    /// Queue unsolicited bytes for reading right away.
    pub fn push(&self, bytes: &str) {
        self.push_bytes(bytes.as_bytes());
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Queue bytes that become readable once the clock reaches `at_ms`.
    pub fn push_at(&self, at_ms: u64, bytes: &str) {
        self.0
            .borrow_mut()
            .timed
            .push((at_ms, bytes.as_bytes().to_vec()));
    }

    /// Every command line written so far, without terminators. Raw
    /// payloads show up glued to the next line.
    pub fn commands(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow().written)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn sent(&self, cmd: &str) -> bool {
        self.commands().iter().any(|c| c == cmd)
    }

    /// Scripted steps the driver never triggered.
    pub fn remaining(&self) -> usize {
        self.0.borrow().steps.len()
    }

    pub fn clear_log(&self) {
        let mut s = self.0.borrow_mut();
        s.written.clear();
        s.unmatched.clear();
    }

    pub fn now_ms(&self) -> u64 {
        self.0.borrow().now_ms
    }

    /// Serve one byte per read, each costing `ms` of virtual time.
    pub fn trickle(&self, ms: u64) {
        self.0.borrow_mut().trickle_ms = Some(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.0.borrow_mut().now_ms += ms;
    }

    pub fn serial(&self) -> ScriptedSerial {
        ScriptedSerial(self.clone())
    }

    pub fn clock(&self) -> VirtualClock {
        VirtualClock(self.clone())
    }
}

pub struct ScriptedSerial(Script);

impl SerialPort for ScriptedSerial {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut s = (self.0).0.borrow_mut();
        s.release_due();
        let limit = if s.trickle_ms.is_some() { buf.len().min(1) } else { buf.len() };
        let mut n = 0;
        while n < limit {
            match s.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        if let Some(cost) = s.trickle_ms.filter(|_| n > 0) {
            s.now_ms += cost;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        let mut s = (self.0).0.borrow_mut();
        s.written.extend_from_slice(data);
        s.unmatched.extend_from_slice(data);
        let fire = s
            .steps
            .front()
            .is_some_and(|step| s.unmatched.ends_with(&step.on));
        if fire {
            if let Some(step) = s.steps.pop_front() {
                s.rx.extend(step.reply);
                s.unmatched.clear();
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        let s = (self.0).0.borrow();
        !s.rx.is_empty() || s.timed.iter().any(|(at, _)| *at <= s.now_ms)
    }
}

pub struct VirtualClock(Script);

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        (self.0).0.borrow().now_ms
    }

    fn delay_ms(&mut self, ms: u32) {
        (self.0).0.borrow_mut().now_ms += u64::from(ms);
    }
}

// ── Power key ────────────────────────────────────────────────

/// Queues the boot banners on every pulse.
pub struct MockPowerKey {
    script: Script,
    pub pulses: Vec<u32>,
    pub banners: bool,
}

#[allow(dead_code)]
impl MockPowerKey {
    pub fn new(script: &Script) -> Self {
        Self {
            script: script.clone(),
            pulses: Vec::new(),
            banners: true,
        }
    }
}

impl PowerKey for MockPowerKey {
    fn pulse(&mut self, hold_ms: u32) {
        self.pulses.push(hold_ms);
        if self.banners {
            self.script.push("\r\nRDY\r\n\r\nAPP RDY\r\n");
        }
    }
}

// ── Download observer ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    Pending(u16, usize),
    Finished,
    Failed,
}

/// Records observer calls; `Send` so it fits the driver's boxed observer.
#[derive(Clone, Default)]
pub struct RecordingObserver(pub Arc<Mutex<Vec<Download>>>);

#[allow(dead_code)]
impl RecordingObserver {
    pub fn calls(&self) -> Vec<Download> {
        self.0.lock().unwrap().clone()
    }
}

impl DownloadObserver for RecordingObserver {
    fn pending(&mut self, status: u16, content_length: usize) {
        self.0
            .lock()
            .unwrap()
            .push(Download::Pending(status, content_length));
    }

    fn finished(&mut self) {
        self.0.lock().unwrap().push(Download::Finished);
    }

    fn failed(&mut self) {
        self.0.lock().unwrap().push(Download::Failed);
    }
}

// ── Builders ─────────────────────────────────────────────────

pub type TestModem = Modem<ScriptedSerial, VirtualClock>;

/// Fast timeouts so failing waits stay cheap in virtual time.
pub fn test_config() -> ModemConfig {
    ModemConfig {
        command_timeout_ms: 500,
        query_timeout_ms: 200,
        socket_open_timeout_ms: 1_000,
        socket_close_timeout_ms: 500,
        socket_send_timeout_ms: 500,
        configure_settle_ms: 10,
        boot_banner_timeout_ms: 1_000,
        ..ModemConfig::default()
    }
}

pub fn modem() -> (TestModem, Script) {
    modem_with(test_config())
}

pub fn modem_with(config: ModemConfig) -> (TestModem, Script) {
    let script = Script::new();
    let modem = Modem::new(script.serial(), script.clock(), config).unwrap();
    (modem, script)
}

/// A modem whose context 1 is up with address 10.0.0.2.
#[allow(dead_code)]
pub fn attached_modem() -> (TestModem, Script) {
    let (mut modem, script) = modem();
    script
        .on("AT+QICSGP=1,1,\"internet\",\"\",\"\",0", "\r\nOK\r\n")
        .on("AT+QIACT=1", "\r\nOK\r\n")
        .on("AT+QIACT?", "\r\n+QIACT: 1,1,1,\"10.0.0.2\"\r\n\r\nOK\r\n");
    modem.setup_context(1, "internet").unwrap();
    modem.open_pdp_context(1).unwrap();
    script.clear_log();
    (modem, script)
}

/// [`attached_modem`] with socket `id` connected to example.com:80.
#[allow(dead_code)]
pub fn connected_socket(id: u8) -> (TestModem, Script) {
    let (mut modem, script) = attached_modem();
    script.on(
        &format!("AT+QIOPEN=1,{},\"TCP\",\"example.com\",80,0,0", id),
        &format!("\r\nOK\r\n\r\n+QIOPEN: {},0\r\n", id),
    );
    modem.tcp_connect(id, "example.com", 80, None).unwrap();
    script.clear_log();
    (modem, script)
}
