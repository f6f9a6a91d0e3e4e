//! Native host stack interface.
//!
//! The host stack owns the radio, the ATT bearer, and all discovered GATT
//! objects. This crate drives it through [`Central`] and [`Peripheral`]
//! requests, and the host reports every outcome later as a [`CentralEvent`] or
//! a [`PeripheralEvent`] delivered from its own thread. Completions carry no
//! request identifier.

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::gap::{ServiceData, Uuid};
use crate::gatt::Prop;
use crate::le::Addr;

#[cfg(test)]
pub(crate) mod mock;

/// Error reported by the host stack, propagated verbatim.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("host error {code}: {msg}")]
pub struct Error {
    code: i64,
    msg: String,
}

impl Error {
    /// Creates a host error with a domain-specific code and description.
    #[inline]
    #[must_use]
    pub fn new(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    /// Returns the host error code.
    #[inline(always)]
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }
}

/// Common host result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Central manager (adapter) state.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum State {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Opaque reference to a host-owned GATT object.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Handle(pub u64);

/// Host-side service object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Service {
    pub hdl: Handle,
    pub uuid: Uuid,
}

/// Host-side characteristic object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Characteristic {
    pub hdl: Handle,
    pub uuid: Uuid,
    pub props: Prop,
}

/// Host-side descriptor object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    pub hdl: Handle,
    pub uuid: Uuid,
}

/// Advertising fields decoded by the host. Optional fields are `None` when
/// absent from the advertisement.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AdvFields {
    pub local_name: Option<String>,
    pub mfg_data: Vec<u8>,
    pub svc_uuids: Vec<Uuid>,
    pub svc_data: Vec<ServiceData>,
    pub connectable: Option<bool>,
    pub tx_power: Option<i8>,
}

/// Central manager operations. Every method only submits a request; outcomes
/// arrive as [`CentralEvent`]s.
pub trait Central: Debug + Send + Sync {
    /// Returns the current adapter state.
    fn state(&self) -> State;

    /// Starts scanning, optionally restricted to peers advertising `services`.
    fn scan(&self, services: &[Uuid], allow_dup: bool);

    /// Stops scanning.
    fn stop_scan(&self);

    /// Returns a peer that the host has seen before, either through a scan or
    /// a previous connection.
    fn retrieve_peripheral(&self, addr: Addr) -> Option<Arc<dyn Peripheral>>;

    /// Initiates a connection to `p`.
    fn connect(&self, p: &dyn Peripheral);

    /// Cancels a pending connection or disconnects an established one.
    fn cancel_connect(&self, p: &dyn Peripheral);
}

/// Remote peer operations. Request methods return immediately; outcomes
/// arrive as [`PeripheralEvent`]s. Accessors return the host's current view of
/// discovered objects.
pub trait Peripheral: Debug + Send + Sync {
    /// Returns the peer address.
    fn addr(&self) -> Addr;

    /// Returns the GAP device name or the advertised name, if known.
    fn name(&self) -> Option<String>;

    /// Returns the current ATT MTU.
    fn mtu(&self) -> u16;

    fn discover_services(&self, filter: &[Uuid]);
    fn services(&self) -> Vec<Service>;

    fn discover_characteristics(&self, filter: &[Uuid], s: &Service);
    fn characteristics(&self, s: &Service) -> Vec<Characteristic>;

    fn discover_descriptors(&self, c: &Characteristic);
    fn descriptors(&self, c: &Characteristic) -> Vec<Descriptor>;

    fn read_characteristic(&self, c: &Characteristic);
    fn write_characteristic(&self, c: &Characteristic, v: &[u8], with_rsp: bool);

    fn read_descriptor(&self, d: &Descriptor);
    fn write_descriptor(&self, d: &Descriptor, v: &[u8]);

    /// Enables or disables notifications or indications for `c`.
    fn set_notify(&self, c: &Characteristic, enable: bool);

    fn read_rssi(&self);
}

/// Central manager callbacks.
#[derive(Debug)]
#[non_exhaustive]
pub enum CentralEvent {
    StateUpdated(State),
    PeripheralDiscovered {
        peer: Arc<dyn Peripheral>,
        adv: AdvFields,
        rssi: i16,
    },
    Connected(Arc<dyn Peripheral>),
    ConnectFailed {
        addr: Addr,
        err: Error,
    },
    Disconnected {
        addr: Addr,
        err: Option<Error>,
    },
}

/// Peripheral (GATT) callbacks. None of them identify the originating request.
#[derive(Debug)]
#[non_exhaustive]
pub enum PeripheralEvent {
    ServicesDiscovered(Result<()>),
    CharacteristicsDiscovered(Service, Result<()>),
    DescriptorsDiscovered(Characteristic, Result<()>),
    /// Characteristic value update, caused either by a read or by a
    /// notification.
    CharacteristicValue(Characteristic, Result<Vec<u8>>),
    DescriptorValue(Descriptor, Result<Vec<u8>>),
    CharacteristicWritten(Characteristic, Result<()>),
    DescriptorWritten(Descriptor, Result<()>),
    NotifyStateChanged(Characteristic, Result<()>),
    RssiRead(Result<i16>),
}
