//! Bounds-checked ids for the fixed connection tables.
//!
//! Constructing an id is the only range check; once a caller holds one,
//! indexing the registry cannot go out of bounds.

use core::fmt;

use crate::error::{Error, IdKind};

/// PDP contexts tracked by the driver (module supports 1..=16).
pub const MAX_CONTEXTS: usize = 4;
/// Socket connect ids tracked by the driver (module supports 0..=11).
pub const MAX_SOCKETS: usize = 6;
/// MQTT client slots (module supports 0..=5).
pub const MAX_MQTT_CLIENTS: usize = 6;
/// TLS context ids accepted by `AT+QSSLCFG` (0..=5).
pub const MAX_TLS_PROFILES: u8 = 6;

/// PDP context id. External numbering is 1-based, storage is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u8);

impl ContextId {
    pub const fn new(cid: u8) -> Option<Self> {
        if cid >= 1 && cid as usize <= MAX_CONTEXTS {
            Some(Self(cid))
        } else {
            None
        }
    }

    /// The 1-based id used on the wire.
    pub const fn get(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize - 1
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (1..=MAX_CONTEXTS as u8).map(Self)
    }
}

/// Socket connect id (0-based on the wire and in storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u8);

impl SocketId {
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < MAX_SOCKETS {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_SOCKETS as u8).map(Self)
    }
}

/// MQTT client id (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MqttClientId(u8);

impl MqttClientId {
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < MAX_MQTT_CLIENTS {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_MQTT_CLIENTS as u8).map(Self)
    }
}

macro_rules! id_conversions {
    ($ty:ident, $kind:expr) => {
        impl TryFrom<u8> for $ty {
            type Error = Error;

            fn try_from(raw: u8) -> Result<Self, Error> {
                Self::new(raw).ok_or(Error::InvalidId($kind, raw))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_conversions!(ContextId, IdKind::Context);
id_conversions!(SocketId, IdKind::Socket);
id_conversions!(MqttClientId, IdKind::MqttClient);

/// Validate a TLS context id.
pub fn tls_profile(raw: u8) -> Result<u8, Error> {
    if raw < MAX_TLS_PROFILES {
        Ok(raw)
    } else {
        Err(Error::InvalidId(IdKind::TlsProfile, raw))
    }
}
