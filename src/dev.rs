//! Central-role device.
//!
//! [`Device`] receives all host callbacks. Central manager callbacks go through
//! [`Device::handle`] and per-peer GATT callbacks through
//! [`Device::handle_peripheral`], which routes them to the matching
//! connection.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub use config::*;

use crate::gap::{AdvHandler, Advertisement, Uuid};
use crate::gatt::{Client, Conn};
use crate::host::{Central, CentralEvent, Peripheral, PeripheralEvent, State};
use crate::le::Addr;
use crate::{Error, Result, SyncMutex};

use registry::Registry;

mod config;
mod registry;


type ConnectTx = oneshot::Sender<Result<Arc<Conn>>>;

/// Bluetooth LE central device.
#[derive(Debug)]
pub struct Device {
    central: Arc<dyn Central>,
    cfg: Config,
    state: watch::Sender<Option<State>>,
    conns: Registry,
    scan: SyncMutex<Scan>,
    dial: tokio::sync::Mutex<()>,
    connect: SyncMutex<Option<(Addr, ConnectTx)>>,
}

impl Device {
    /// Creates a device for a host central manager.
    #[must_use]
    pub fn new(central: Arc<dyn Central>, cfg: Config) -> Self {
        Self {
            central,
            cfg,
            state: watch::channel(None).0,
            conns: Registry::default(),
            scan: SyncMutex::default(),
            dial: tokio::sync::Mutex::default(),
            connect: SyncMutex::default(),
        }
    }

    /// Waits for the host to report the adapter state and checks that the
    /// adapter is powered on.
    pub async fn start(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let wait = async move {
            loop {
                if let Some(s) = *rx.borrow_and_update() {
                    return s;
                }
                // The sender is owned by self
                let _ = rx.changed().await;
            }
        };
        let s = match self.cfg.startup_timeout {
            Some(t) => (tokio::time::timeout(t, wait).await).map_err(|_| Error::StartupTimeout)?,
            None => wait.await,
        };
        if s != State::PoweredOn {
            return Err(Error::Startup(s));
        }
        debug!("Central manager started");
        Ok(())
    }

    /// Returns the last reported adapter state.
    #[must_use]
    pub fn state(&self) -> Option<State> {
        *self.state.borrow()
    }

    /// Scans for advertising peers until `cancel` is triggered. Scanning also
    /// stops if the returned future is dropped. A concurrent scan replaces the
    /// handler of an earlier one, which then no longer stops native scanning.
    pub async fn scan(
        &self,
        cancel: CancellationToken,
        allow_dup: bool,
        f: impl Into<AdvHandler>,
    ) -> Result<()> {
        let seq = {
            let mut scan = self.scan.lock();
            scan.seq = scan.seq.wrapping_add(1);
            scan.f = Some(f.into());
            scan.seq
        };
        let _guard = ScanGuard(self, seq);
        debug!("Scan started");
        self.central.scan(&self.cfg.scan_services, allow_dup);
        cancel.cancelled().await;
        Ok(())
    }

    /// Connects to the peer identified by `addr`, which the host must have
    /// seen before. Only one connection attempt is outstanding at a time.
    ///
    /// Triggering `cancel` fails the call with [`Error::Canceled`]. If the
    /// host completes the connection afterwards, it is disconnected.
    pub async fn dial(&self, cancel: CancellationToken, addr: &str) -> Result<Client> {
        let a: Addr = (addr.parse()).map_err(|_| Error::AddressInvalid(addr.to_owned()))?;
        let peer = (self.central.retrieve_peripheral(a)).ok_or(Error::AddressNotFound(a))?;
        let _dial = tokio::select! {
            g = self.dial.lock() => g,
            _ = cancel.cancelled() => return Err(Error::Canceled),
        };
        let (tx, mut rx) = oneshot::channel();
        *self.connect.lock() = Some((a, tx));
        debug!("Connecting to {a}");
        self.central.connect(peer.as_ref());
        let r = tokio::select! {
            biased;
            r = &mut rx => r.unwrap_or(Err(Error::Canceled)),
            _ = cancel.cancelled() => {
                self.connect.lock().take();
                // A connection completed after close() can no longer be sent
                rx.close();
                if let Ok(Ok(conn)) = rx.try_recv() {
                    warn!("Disconnecting from {a} after a canceled dial");
                    self.discard(&conn);
                }
                debug!("Canceled connection to {a}");
                return Err(Error::Canceled);
            }
        };
        Ok(Client::new(r?, Arc::clone(&self.central)))
    }

    /// Returns the client of a live connection.
    #[must_use]
    pub fn client(&self, addr: Addr) -> Option<Client> {
        (self.conns.get(addr)).map(|c| Client::new(c, Arc::clone(&self.central)))
    }

    /// Disconnects all peers and fails any connection attempt.
    pub fn stop(&self) {
        if let Some((a, tx)) = self.connect.lock().take() {
            debug!("Aborting connection to {a}");
            let _ = tx.send(Err(Error::Canceled));
        }
        for c in self.conns.drain() {
            self.central.cancel_connect(c.peer());
            c.close();
        }
        debug!("Central stopped");
    }

    /// Handles a central manager callback.
    pub fn handle(&self, evt: CentralEvent) {
        match evt {
            CentralEvent::StateUpdated(s) => {
                debug!("Central manager state: {s}");
                self.state.send_replace(Some(s));
            }
            CentralEvent::PeripheralDiscovered { peer, adv, rssi } => {
                let f = self.scan.lock().f.clone();
                match f {
                    Some(f) => f.call(Advertisement::new(peer.addr(), adv, rssi)),
                    None => trace!("Dropped advertisement from {}", peer.addr()),
                }
            }
            CentralEvent::Connected(peer) => self.connected(peer),
            CentralEvent::ConnectFailed { addr, err } => match self.take_connect(addr) {
                Some(tx) => {
                    debug!("Connection to {addr} failed: {err}");
                    let _ = tx.send(Err(err.into()));
                }
                None => warn!("Ignored connection failure for {addr}: {err}"),
            },
            CentralEvent::Disconnected { addr, err } => match self.conns.remove(addr) {
                Some(c) => {
                    match err {
                        Some(e) => debug!("Disconnected from {addr}: {e}"),
                        None => debug!("Disconnected from {addr}"),
                    }
                    c.close();
                }
                None => trace!("Ignored disconnect of unknown peer {addr}"),
            },
        }
    }

    /// Handles a GATT callback for peer `addr`.
    pub fn handle_peripheral(&self, addr: Addr, evt: PeripheralEvent) {
        match self.conns.get(addr) {
            Some(c) => c.handle(evt),
            None => trace!("Dropped event for unknown peer {addr}: {evt:?}"),
        }
    }

    /// Completes a connection attempt.
    fn connected(&self, peer: Arc<dyn Peripheral>) {
        let addr = peer.addr();
        let Some(tx) = self.take_connect(addr) else {
            if self.conns.get(addr).is_some() {
                warn!("Ignored duplicate connection to {addr}");
            } else {
                warn!("Disconnecting from {addr} without a pending dial");
                self.central.cancel_connect(peer.as_ref());
            }
            return;
        };
        let conn = Conn::new(peer);
        let r = self.conns.insert(Arc::clone(&conn)).map(|_| conn);
        match r {
            Ok(_) => debug!("Connected to {addr}"),
            Err(ref e) => warn!("Rejected connection: {e}"),
        }
        if let Err(Ok(conn)) = tx.send(r) {
            warn!("Disconnecting from {addr} after an abandoned dial");
            self.discard(&conn);
        }
    }

    /// Unregisters and disconnects a connection that has no owner.
    fn discard(&self, conn: &Arc<Conn>) {
        if (self.conns.get(conn.addr())).map_or(false, |c| Arc::ptr_eq(&c, conn)) {
            self.conns.remove(conn.addr());
        }
        self.central.cancel_connect(conn.peer());
        conn.close();
    }

    /// Removes the pending connection attempt for `addr`.
    fn take_connect(&self, addr: Addr) -> Option<ConnectTx> {
        let mut slot = self.connect.lock();
        match slot.take() {
            Some((a, tx)) if a == addr => Some(tx),
            other => {
                *slot = other;
                None
            }
        }
    }
}

/// Peripheral role operations. None of them are supported.
impl Device {
    pub fn add_service(&self, uuid: Uuid) -> Result<()> {
        let _ = uuid;
        Err(Error::NotSupported)
    }

    pub fn remove_all_services(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    pub fn set_services(&self, uuids: &[Uuid]) -> Result<()> {
        let _ = uuids;
        Err(Error::NotSupported)
    }

    pub async fn advertise(&self, cancel: CancellationToken, adv: &Advertisement) -> Result<()> {
        let _ = (cancel, adv);
        Err(Error::NotSupported)
    }

    pub async fn advertise_name_and_services(
        &self,
        cancel: CancellationToken,
        name: &str,
        uuids: &[Uuid],
    ) -> Result<()> {
        let _ = (cancel, name, uuids);
        Err(Error::NotSupported)
    }

    pub async fn advertise_mfg_data(
        &self,
        cancel: CancellationToken,
        id: u16,
        data: &[u8],
    ) -> Result<()> {
        let _ = (cancel, id, data);
        Err(Error::NotSupported)
    }

    pub async fn advertise_service_data16(
        &self,
        cancel: CancellationToken,
        id: u16,
        data: &[u8],
    ) -> Result<()> {
        let _ = (cancel, id, data);
        Err(Error::NotSupported)
    }

    pub async fn advertise_ibeacon_data(
        &self,
        cancel: CancellationToken,
        data: &[u8],
    ) -> Result<()> {
        let _ = (cancel, data);
        Err(Error::NotSupported)
    }

    pub async fn advertise_ibeacon(
        &self,
        cancel: CancellationToken,
        uuid: Uuid,
        major: u16,
        minor: u16,
        tx_power: i8,
    ) -> Result<()> {
        let _ = (cancel, uuid, major, minor, tx_power);
        Err(Error::NotSupported)
    }
}

/// Advertisement handler of the most recent scan.
#[derive(Debug, Default)]
struct Scan {
    seq: u64,
    f: Option<AdvHandler>,
}

/// Stops scan `seq` when dropped, unless it was replaced by a later scan.
struct ScanGuard<'a>(&'a Device, u64);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        {
            let mut scan = self.0.scan.lock();
            if scan.seq != self.1 {
                trace!("Scan {} replaced", self.1);
                return;
            }
            scan.f = None;
        }
        self.0.central.stop_scan();
        debug!("Scan stopped");
    }
}
