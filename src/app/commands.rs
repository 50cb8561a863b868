//! Inbound requests to the modem actor.
//!
//! Other tasks cannot touch the [`Modem`](crate::Modem) directly; they queue
//! one of these and read the matching
//! [`ModemEvent::Completed`](crate::app::events::ModemEvent::Completed) back.

use heapless::{String, Vec};

use crate::modem::MAX_SEND_LEN;

/// Requests other tasks can send into the modem actor.
#[derive(Debug, Clone)]
pub enum ModemRequest {
    /// Store the APN and activate PDP context `cid`.
    OpenContext { cid: u8, apn: String<64> },

    /// Deactivate PDP context `cid`.
    CloseContext { cid: u8 },

    /// Open socket `id`; TLS when `tls_profile` is set.
    TcpConnect {
        id: u8,
        host: String<128>,
        port: u16,
        cid: Option<u8>,
        tls_profile: Option<u8>,
    },

    TcpSend { id: u8, data: Vec<u8, MAX_SEND_LEN> },

    TcpClose { id: u8 },

    /// Initialise, open and connect MQTT client `client` over context `cid`.
    MqttConnect {
        client: u8,
        cid: u8,
        host: String<128>,
        port: u16,
        client_id: String<64>,
        username: Option<String<64>>,
        password: Option<String<64>>,
    },

    MqttSubscribe {
        client: u8,
        topic: String<128>,
        qos: u8,
    },

    MqttPublish {
        client: u8,
        topic: String<128>,
        payload: Vec<u8, 1024>,
        qos: u8,
        retain: bool,
    },

    MqttDisconnect { client: u8 },

    /// Download `url` into the module file `filename`.
    HttpDownload { url: String<256>, filename: String<64> },

    SendSms { number: String<32>, text: String<160> },

    /// Write a status summary to the log.
    LogStatus,
}

/// Payload-free tag of a [`ModemRequest`], echoed in completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    OpenContext,
    CloseContext,
    TcpConnect,
    TcpSend,
    TcpClose,
    MqttConnect,
    MqttSubscribe,
    MqttPublish,
    MqttDisconnect,
    HttpDownload,
    SendSms,
    LogStatus,
}

impl ModemRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::OpenContext { .. } => RequestKind::OpenContext,
            Self::CloseContext { .. } => RequestKind::CloseContext,
            Self::TcpConnect { .. } => RequestKind::TcpConnect,
            Self::TcpSend { .. } => RequestKind::TcpSend,
            Self::TcpClose { .. } => RequestKind::TcpClose,
            Self::MqttConnect { .. } => RequestKind::MqttConnect,
            Self::MqttSubscribe { .. } => RequestKind::MqttSubscribe,
            Self::MqttPublish { .. } => RequestKind::MqttPublish,
            Self::MqttDisconnect { .. } => RequestKind::MqttDisconnect,
            Self::HttpDownload { .. } => RequestKind::HttpDownload,
            Self::SendSms { .. } => RequestKind::SendSms,
            Self::LogStatus => RequestKind::LogStatus,
        }
    }
}
