use std::fmt::{Display, Formatter};

use crate::gap::Uuid;
use crate::gatt::{Class, EntityKind};
use crate::{host, le};

/// Error type returned by the central bridge.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Host(#[from] host::Error),
    #[error("invalid peer address: {0:?}")]
    AddressInvalid(String),
    #[error("no peer with address {0}")]
    AddressNotFound(le::Addr),
    #[error("central manager has invalid state: have={0}, want={}", host::State::PoweredOn)]
    Startup(host::State),
    #[error("timeout while waiting for the central manager state")]
    StartupTimeout,
    #[error("connection already exists: addr={0}")]
    DuplicateConnection(le::Addr),
    #[error("no {kind} with UUID {uuid}")]
    EntityNotFound { kind: EntityKind, uuid: Uuid },
    #[error("characteristic {0} already has a pending read")]
    AlreadyPending(Uuid),
    #[error("{0} request already in flight")]
    Busy(Class),
    #[error("not supported")]
    NotSupported,
    #[error("not implemented")]
    NotImplemented,
    #[error("connection closed")]
    Disconnected,
    #[error("operation canceled")]
    Canceled,
    #[error("can't discover {stage}: {source}")]
    Discovery { stage: Stage, source: Box<Error> },
}

impl Error {
    /// Returns the host-reported error, if any. Discovery errors are unwrapped
    /// to their underlying cause.
    #[must_use]
    pub fn host(&self) -> Option<&host::Error> {
        match *self {
            Self::Host(ref e) => Some(e),
            Self::Discovery { ref source, .. } => source.host(),
            _ => None,
        }
    }
}

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a full profile discovery walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_enums)]
pub enum Stage {
    Services,
    Characteristics,
    Descriptors,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Services => "services",
            Self::Characteristics => "characteristics",
            Self::Descriptors => "descriptors",
        })
    }
}

impl Stage {
    /// Wraps a discovery failure at this stage.
    #[inline]
    pub(crate) fn wrap(self, e: Error) -> Error {
        Error::Discovery {
            stage: self,
            source: Box::new(e),
        }
    }
}
