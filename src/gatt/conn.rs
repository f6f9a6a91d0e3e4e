use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace};

use crate::host::{Peripheral, PeripheralEvent};
use crate::le::Addr;
use crate::{Error, Result, SyncMutex};

use super::bridge::{EventBridge, Outcome};
use super::cache::ProfileCache;
use super::demux::ReadDemux;
use super::subs::SubscriptionTable;
use super::*;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) enum ConnState {
    #[default]
    Connected,
    Disconnecting,
    Closed,
}

/// Live connection to a remote GATT server. It owns all per-connection state,
/// and receives the host callbacks for its peer.
///
/// Every shared structure is guarded by its own mutex. If more than one is
/// ever held at once, they must be acquired in this order: device registry,
/// `profile`, `cache`, `subs`, `demux`, `bridge`. Handlers are always invoked
/// with no lock held.
#[derive(Debug)]
pub(crate) struct Conn {
    addr: Addr,
    peer: Arc<dyn Peripheral>,
    state: SyncMutex<ConnState>,
    pub(super) profile: SyncMutex<Option<Arc<Profile>>>,
    pub(super) cache: ProfileCache,
    pub(super) subs: SubscriptionTable,
    pub(super) demux: ReadDemux,
    bridge: EventBridge,
    serial: [tokio::sync::Mutex<()>; Class::COUNT],
    closed: CancellationToken,
}

impl Conn {
    /// Creates a connection for a peer that was just connected.
    pub fn new(peer: Arc<dyn Peripheral>) -> Arc<Self> {
        Arc::new(Self {
            addr: peer.addr(),
            peer,
            state: SyncMutex::default(),
            profile: SyncMutex::default(),
            cache: ProfileCache::default(),
            subs: SubscriptionTable::default(),
            demux: ReadDemux::default(),
            bridge: EventBridge::default(),
            serial: Default::default(),
            closed: CancellationToken::new(),
        })
    }

    /// Returns the peer address.
    #[inline(always)]
    pub const fn addr(&self) -> Addr {
        self.addr
    }

    /// Returns the host peer object.
    #[inline(always)]
    pub fn peer(&self) -> &dyn Peripheral {
        self.peer.as_ref()
    }

    /// Returns the lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    /// Returns an error if the connection is closed.
    pub fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnState::Closed => Err(Error::Disconnected),
            _ => Ok(()),
        }
    }

    /// Marks the connection as being torn down by the local side.
    pub fn disconnecting(&self) -> Result<()> {
        let mut st = self.state.lock();
        match *st {
            ConnState::Closed => Err(Error::Disconnected),
            ConnState::Connected => {
                debug!("Disconnecting from {}", self.addr);
                *st = ConnState::Disconnecting;
                Ok(())
            }
            ConnState::Disconnecting => Ok(()),
        }
    }

    /// Performs a request of class `c`. Same-class requests are serialized.
    /// The completion slot is registered before `f` issues the host request.
    pub(super) async fn request(
        &self,
        c: Class,
        f: impl FnOnce(&dyn Peripheral),
    ) -> Result<Outcome> {
        let _serial = self.serial[c as usize].lock().await;
        let p = self.bridge.issue(c)?;
        f(self.peer());
        let r = p.wait().await;
        if let Err(ref e) = r {
            debug!("{c} failed for {}: {e}", self.addr);
        }
        r
    }

    /// Returns a future that resolves when the connection is closed.
    #[inline]
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }

    /// Handles a host callback for this connection.
    pub fn handle(&self, evt: PeripheralEvent) {
        use PeripheralEvent::*;
        trace!("{}: {evt:?}", self.addr);
        match evt {
            ServicesDiscovered(r) => self.done(Class::ServicesDiscovered, r),
            CharacteristicsDiscovered(_, r) => self.done(Class::CharacteristicsDiscovered, r),
            DescriptorsDiscovered(_, r) => self.done(Class::DescriptorsDiscovered, r),
            CharacteristicValue(c, r) => {
                let ids = self.cache.characteristic_ids(c.hdl);
                self.demux.dispatch(&self.subs, &ids, r);
            }
            DescriptorValue(_, r) => {
                self.fulfill(Class::DescriptorRead, r.map(Outcome::Value));
            }
            CharacteristicWritten(_, r) => self.done(Class::CharacteristicWritten, r),
            DescriptorWritten(_, r) => self.done(Class::DescriptorWritten, r),
            NotifyStateChanged(c, r) => {
                if r.is_ok() {
                    // Handlers must be active before the subscriber is woken
                    self.subs.activate(&self.cache.characteristic_ids(c.hdl));
                }
                self.done(Class::NotifyStateChanged, r);
            }
            RssiRead(r) => self.fulfill(Class::RssiRead, r.map(Outcome::Rssi)),
        }
    }

    #[inline]
    fn done(&self, c: Class, r: crate::host::Result<()>) {
        self.fulfill(c, r.map(|_| Outcome::Done));
    }

    #[inline]
    fn fulfill(&self, c: Class, r: crate::host::Result<Outcome>) {
        self.bridge.fulfill(c, r.map_err(Error::from));
    }

    /// Closes the connection after the host reported a disconnect. All pending
    /// and future requests fail with [`Error::Disconnected`].
    pub fn close(&self) {
        {
            let mut st = self.state.lock();
            if *st == ConnState::Closed {
                return;
            }
            *st = ConnState::Closed;
        }
        debug!("Closed connection to {}", self.addr);
        self.demux.close();
        self.bridge.close();
        self.closed.cancel();
    }
}
