//! Unified error types for the BGxx driver.
//!
//! A single `Error` enum that every subsystem converts into, so callers
//! handle modem failures uniformly. All variants are `Copy` so they can be
//! returned from deep inside the transaction engine without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level driver error
// ---------------------------------------------------------------------------

/// Every fallible driver operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The command/response exchange itself failed.
    At(AtError),
    /// Serial port read or write failed.
    Transport(TransportError),
    /// A PDP context operation failed.
    Context(ContextError),
    /// A TCP/TLS socket operation failed.
    Socket(SocketError),
    /// An MQTT session operation failed.
    Mqtt(MqttError),
    /// The HTTP download orchestrator refused or failed.
    Http(HttpError),
    /// An id was outside its fixed table range.
    InvalidId(IdKind, u8),
    /// A handler slot that accepts only one registration is occupied.
    HandlerAlreadySet,
    /// Module did not boot or no SIM card was detected.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(e) => write!(f, "at: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Context(e) => write!(f, "context: {e}"),
            Self::Socket(e) => write!(f, "socket: {e}"),
            Self::Mqtt(e) => write!(f, "mqtt: {e}"),
            Self::Http(e) => write!(f, "http: {e}"),
            Self::InvalidId(kind, id) => write!(f, "invalid {kind} id {id}"),
            Self::HandlerAlreadySet => write!(f, "handler already registered"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

/// Which id space an [`Error::InvalidId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Context,
    Socket,
    MqttClient,
    TlsProfile,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "context"),
            Self::Socket => write!(f, "socket"),
            Self::MqttClient => write!(f, "mqtt client"),
            Self::TlsProfile => write!(f, "tls profile"),
        }
    }
}

// ---------------------------------------------------------------------------
// AT transaction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtError {
    /// No terminal response before the deadline.
    Timeout,
    /// The module answered `ERROR` (or `SEND FAIL`).
    Rejected,
    /// The module answered `+CME ERROR: <n>` / `+CMS ERROR: <n>`.
    /// Verbose (non-numeric) codes are reported as `u16::MAX`.
    Cme(u16),
    /// Terminal `OK` arrived but the expected token or payload did not.
    Unexpected,
    /// Command does not fit in the outbound line buffer.
    CommandTooLong,
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Rejected => write!(f, "command rejected"),
            Self::Cme(code) => write!(f, "CME error {code}"),
            Self::Unexpected => write!(f, "expected response missing"),
            Self::CommandTooLong => write!(f, "command too long"),
        }
    }
}

impl From<AtError> for Error {
    fn from(e: AtError) -> Self {
        Self::At(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    ReadFailed,
    WriteFailed,
    /// Fewer bytes were written than requested.
    ShortWrite,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "serial read failed"),
            Self::WriteFailed => write!(f, "serial write failed"),
            Self::ShortWrite => write!(f, "short serial write"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// PDP context errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context has not been attached (`+QIACT` reports it down).
    NotConnected,
    /// The context is already attached.
    AlreadyConnected,
    /// The last signal query reported no service.
    NoService,
    /// `AT+QIACT` failed; the retry back-off has been advanced.
    ActivationFailed,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "context not connected"),
            Self::AlreadyConnected => write!(f, "context already connected"),
            Self::NoService => write!(f, "no network service"),
            Self::ActivationFailed => write!(f, "context activation failed"),
        }
    }
}

impl From<ContextError> for Error {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

// ---------------------------------------------------------------------------
// Socket errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// Open confirmation carried a non-zero result code.
    OpenFailed(u16),
    /// Operation requires a connected socket.
    NotConnected,
    /// Host name exceeds the fixed host buffer.
    HostTooLong,
    /// Payload exceeds what a single send command accepts.
    PayloadTooLarge,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed(code) => write!(f, "open failed with code {code}"),
            Self::NotConnected => write!(f, "socket not connected"),
            Self::HostTooLong => write!(f, "host name too long"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl From<SocketError> for Error {
    fn from(e: SocketError) -> Self {
        Self::Socket(e)
    }
}

// ---------------------------------------------------------------------------
// MQTT errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttError {
    /// Client has not been set up with [`crate::Modem::mqtt_setup`].
    NotConfigured,
    /// Network connection to the broker could not be opened.
    OpenFailed(u16),
    /// Broker refused the MQTT CONNECT.
    Refused(RefusalReason),
    /// CONNECT was not delivered or not answered by the broker.
    ConnectFailed,
    /// Session is not connected.
    NotConnected,
    /// Session was mid-disconnect; it has been torn down.
    Disconnecting,
    /// SUBSCRIBE/UNSUBSCRIBE was not acknowledged with success.
    SubscribeFailed,
    /// Topic list was empty or did not fit in one command.
    InvalidTopics,
    /// The module reported the publish as failed.
    PublishFailed,
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "client not configured"),
            Self::OpenFailed(code) => write!(f, "open failed with code {code}"),
            Self::Refused(reason) => write!(f, "connection refused: {reason}"),
            Self::ConnectFailed => write!(f, "connect not acknowledged"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Disconnecting => write!(f, "session was disconnecting"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::InvalidTopics => write!(f, "invalid topic list"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        Self::Mqtt(e)
    }
}

/// Broker refusal codes reported in `+QMTCONN: <c>,<result>,<code>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    UnacceptableProtocol,
    IdentifierRejected,
    ServerUnavailable,
    NotAuthorized,
    Unknown(u8),
}

impl RefusalReason {
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::UnacceptableProtocol,
            1 => Self::IdentifierRejected,
            2 => Self::ServerUnavailable,
            3 => Self::NotAuthorized,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnacceptableProtocol => write!(f, "Unacceptable Protocol Version"),
            Self::IdentifierRejected => write!(f, "Identifier Rejected"),
            Self::ServerUnavailable => write!(f, "Server Unavailable"),
            Self::NotAuthorized => write!(f, "Not Authorized"),
            Self::Unknown(code) => write!(f, "unknown refusal {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// A download job is already in progress.
    Busy,
    /// URL or filename too long for a single command.
    RequestTooLong,
    /// Module did not answer `CONNECT` to the URL upload.
    NoConnectPrompt,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "download already in progress"),
            Self::RequestTooLong => write!(f, "url or filename too long"),
            Self::NoConnectPrompt => write!(f, "no CONNECT prompt"),
        }
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
