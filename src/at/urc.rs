//! Unsolicited result code classification.
//!
//! [`parse`] turns one received line into a typed [`Urc`], or `None` for
//! lines that belong to whatever transaction is in flight. It is pure: no
//! state, no I/O. Applying an event to the registry is the dispatcher's
//! job (`modem::dispatch`).
//!
//! | Prefix               | Event                                    |
//! |----------------------|------------------------------------------|
//! | `+CREG/+CGREG/+CEREG`| [`Urc::Registration`]                    |
//! | `+QIACT:`            | [`Urc::ContextReport`]                   |
//! | `+QIOPEN/+QSSLOPEN:` | [`Urc::SocketOpened`]                    |
//! | `+QIURC/+QSSLURC:`   | data / closed / PDP deactivated          |
//! | `+CMTI:`             | [`Urc::SmsReceived`]                     |
//! | `+QMTSTAT:`          | [`Urc::MqttStatus`]                      |
//! | `+QMTRECV:`          | [`Urc::MqttRecv`]                        |
//! | `+QMTCONN:`          | [`Urc::MqttConn`]                        |
//! | `+QHTTPGET:`         | [`Urc::HttpGet`]                         |
//! | `+QHTTPREADFILE:`    | [`Urc::HttpReadFile`]                    |
//! | `+CME/+CMS ERROR:`   | [`Urc::CmeError`]                        |
//! | `AT+…`               | [`Urc::Echo`] (local echo is on)         |

use super::fields::{self, num, unquote};

/// Which registration report a [`Urc::Registration`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegDomain {
    /// `+CREG`: circuit switched / generic.
    Cs,
    /// `+CGREG`: EGPRS packet domain.
    Gprs,
    /// `+CEREG`: LTE (eMTC / NB-IoT).
    Lte,
}

impl RegDomain {
    pub const COUNT: usize = 3;

    pub const fn index(self) -> usize {
        match self {
            Self::Cs => 0,
            Self::Gprs => 1,
            Self::Lte => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cs => "network",
            Self::Gprs => "EGPRS",
            Self::Lte => "LTE",
        }
    }
}

/// `<stat>` of a registration report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    NotRegistered,
    Registered,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl RegistrationStatus {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NotRegistered,
            1 => Self::Registered,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::Roaming,
            _ => Self::Unknown,
        }
    }

    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Roaming)
    }
}

impl core::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "not registered"),
            Self::Registered => write!(f, "registered"),
            Self::Searching => write!(f, "connecting"),
            Self::Denied => write!(f, "registration denied"),
            Self::Unknown => write!(f, "unknown"),
            Self::Roaming => write!(f, "registered, roaming"),
        }
    }
}

/// `+QMTRECV:` in either delivery form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttRecv<'a> {
    /// Compact mode: a message is waiting in buffer `channel`.
    Waiting { client: u8, channel: u8 },
    /// A message with its topic. `payload_at` is the byte offset in the line
    /// where the payload starts (after its opening quote, if any).
    Message {
        client: u8,
        msg_id: u16,
        topic: &'a str,
        declared_len: Option<usize>,
        payload_at: usize,
    },
}

/// `+QMTCONN:` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttConn {
    /// `<c>,<result>,<ret_code>`: outcome of a CONNECT.
    Outcome { client: u8, result: u8, code: u8 },
    /// `<c>,<n>`: either the state echo of `AT+QMTCONN?` or a refusal code,
    /// depending on whether a connectivity sweep is running.
    Short { client: u8, value: u8 },
}

/// `+QHTTPGET:` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpGet {
    Response {
        err: u16,
        status: Option<u16>,
        content_length: usize,
    },
    /// Text such as `Http timeout` instead of a result code.
    Malformed,
}

/// A classified unsolicited line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urc<'a> {
    Registration {
        domain: RegDomain,
        status: RegistrationStatus,
    },
    ContextReport {
        cid: u8,
        active: bool,
        ip: Option<&'a str>,
    },
    ContextDeactivated {
        cid: u8,
    },
    SocketOpened {
        socket: u8,
        tls: bool,
        result: u16,
    },
    SocketData {
        socket: u8,
        tls: bool,
    },
    SocketClosed {
        socket: u8,
        tls: bool,
    },
    SmsReceived {
        index: Option<u8>,
    },
    MqttStatus {
        client: u8,
        code: u8,
    },
    MqttRecv(MqttRecv<'a>),
    MqttConn(MqttConn),
    HttpGet(HttpGet),
    HttpReadFile {
        err: Option<u16>,
    },
    CmeError {
        code: u16,
    },
    Echo,
}

/// Classify one trimmed line.
pub fn parse(line: &str) -> Option<Urc<'_>> {
    if line.starts_with("AT+") {
        return Some(Urc::Echo);
    }
    if let Some(code) = fields::cme_code(line) {
        return Some(Urc::CmeError { code });
    }

    let (prefix, params) = line.split_once(':')?;
    let params = params.trim_start();
    match prefix {
        "+CREG" => registration(RegDomain::Cs, params),
        "+CGREG" => registration(RegDomain::Gprs, params),
        "+CEREG" => registration(RegDomain::Lte, params),
        "+QIACT" => context_report(params),
        "+QIOPEN" => socket_opened(params, false),
        "+QSSLOPEN" => socket_opened(params, true),
        "+QIURC" => socket_event(params, false),
        "+QSSLURC" => socket_event(params, true),
        "+CMTI" => Some(Urc::SmsReceived {
            index: fields::split(params).nth(1).and_then(num),
        }),
        "+QMTSTAT" => {
            let mut f = fields::split(params);
            let client = num(f.next()?)?;
            let code = f.next().and_then(num).unwrap_or(0);
            Some(Urc::MqttStatus { client, code })
        }
        "+QMTRECV" => mqtt_recv(line, params).map(Urc::MqttRecv),
        "+QMTCONN" => mqtt_conn(params).map(Urc::MqttConn),
        "+QHTTPGET" => Some(Urc::HttpGet(http_get(params))),
        "+QHTTPREADFILE" => Some(Urc::HttpReadFile {
            err: fields::split(params).next().and_then(num),
        }),
        _ => None,
    }
}

fn registration(domain: RegDomain, params: &str) -> Option<Urc<'static>> {
    // Query form `<n>,<stat>[,...]`, unsolicited form `<stat>[,"lac",...]`.
    let mut f = fields::split(params);
    let first = f.next()?;
    let stat = f
        .next()
        .and_then(|second| second.parse::<u8>().ok())
        .or_else(|| first.parse::<u8>().ok())?;
    Some(Urc::Registration {
        domain,
        status: RegistrationStatus::from_code(stat),
    })
}

fn context_report(params: &str) -> Option<Urc<'_>> {
    // <cid>,<state>,<type>,"<ip>"
    let mut f = fields::split(params);
    let cid = num(f.next()?)?;
    let state: u8 = num(f.next()?)?;
    let ip = f.nth(1).map(unquote).filter(|ip| !ip.is_empty());
    Some(Urc::ContextReport {
        cid,
        active: state == 1,
        ip,
    })
}

fn socket_opened(params: &str, tls: bool) -> Option<Urc<'static>> {
    let mut f = fields::split(params);
    let socket = num(f.next()?)?;
    let result = num(f.next()?)?;
    Some(Urc::SocketOpened {
        socket,
        tls,
        result,
    })
}

fn socket_event(params: &str, tls: bool) -> Option<Urc<'static>> {
    let mut f = fields::split(params);
    let kind = unquote(f.next()?);
    let id = num(f.next()?)?;
    match kind {
        "recv" => Some(Urc::SocketData { socket: id, tls }),
        "closed" => Some(Urc::SocketClosed { socket: id, tls }),
        "pdpdeact" => Some(Urc::ContextDeactivated { cid: id }),
        _ => None,
    }
}

fn mqtt_recv<'a>(line: &'a str, params: &'a str) -> Option<MqttRecv<'a>> {
    let mut f = fields::split(params);
    let client = num(f.next()?)?;
    let second = f.next()?;
    let Some(after_second) = f.remainder() else {
        return Some(MqttRecv::Waiting {
            client,
            channel: num(second)?,
        });
    };
    let msg_id = num(second)?;

    // The payload may contain commas and quotes, so only the topic and the
    // optional length are tokenized; the payload is located by offset.
    let mut rest = fields::split(after_second);
    let topic = unquote(rest.next()?);
    let mut payload_start = rest.remainder()?;
    let mut declared_len = None;
    let mut lookahead = fields::split(payload_start);
    if let (Some(len_field), Some(after_len)) = (lookahead.next(), lookahead.remainder()) {
        if let Ok(len) = len_field.parse::<usize>() {
            declared_len = Some(len);
            payload_start = after_len;
        }
    }

    let mut payload_at = line.len() - payload_start.len();
    if payload_start.starts_with('"') {
        payload_at += 1;
    }
    Some(MqttRecv::Message {
        client,
        msg_id,
        topic,
        declared_len,
        payload_at,
    })
}

fn mqtt_conn(params: &str) -> Option<MqttConn> {
    let mut f = fields::split(params);
    let client = num(f.next()?)?;
    let second = num(f.next()?)?;
    match f.next() {
        Some(third) => Some(MqttConn::Outcome {
            client,
            result: second,
            code: num(third)?,
        }),
        None => Some(MqttConn::Short {
            client,
            value: second,
        }),
    }
}

fn http_get(params: &str) -> HttpGet {
    let mut f = fields::split(params);
    let Some(err) = f.next().and_then(num) else {
        return HttpGet::Malformed;
    };
    HttpGet::Response {
        err,
        status: f.next().and_then(num),
        content_length: f.next().and_then(num).unwrap_or(0),
    }
}
