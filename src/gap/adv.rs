use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::host::AdvFields;
use crate::le::Addr;

use super::Uuid;

/// Service data AD type payload ([CSS] Part A, Section 1.11).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceData {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// Advertisement received while scanning, as decoded by the host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Advertisement {
    /// Address of the advertising peer.
    pub addr: Addr,
    pub local_name: String,
    /// Received signal strength in dBm.
    pub rssi: i16,
    pub mfg_data: Vec<u8>,
    pub svc_uuids: Vec<Uuid>,
    pub svc_data: Vec<ServiceData>,
    /// Whether the peer accepts connections. False when not reported.
    pub connectable: bool,
    /// Advertised TX power level in dBm. Zero when not reported.
    pub tx_power: i8,
}

impl Advertisement {
    /// Creates an advertisement from host-decoded fields.
    #[must_use]
    pub fn new(addr: Addr, f: AdvFields, rssi: i16) -> Self {
        Self {
            addr,
            local_name: f.local_name.unwrap_or_default(),
            rssi,
            mfg_data: f.mfg_data,
            svc_uuids: f.svc_uuids,
            svc_data: f.svc_data,
            connectable: f.connectable.unwrap_or(false),
            tx_power: f.tx_power.unwrap_or(0),
        }
    }
}

/// Advertisement handler called on the host callback thread.
#[derive(Clone)]
#[repr(transparent)]
pub struct AdvHandler(Arc<dyn Fn(Advertisement) + Send + Sync>);

impl AdvHandler {
    #[inline(always)]
    pub(crate) fn call(&self, adv: Advertisement) {
        (self.0)(adv);
    }
}

impl Debug for AdvHandler {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple("AdvHandler").field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T: Fn(Advertisement) + Send + Sync + 'static> From<T> for AdvHandler {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}
