//! Mock host stack for tests. Requests are recorded on a channel, so that
//! tests can check each request and reply with the matching callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::gap::Uuid;
use crate::gatt::{Client, Conn, Prop};
use crate::le::Addr;
use crate::SyncMutex;

use super::*;

/// Recorded host request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Req {
    Scan { svcs: Vec<Uuid>, allow_dup: bool },
    StopScan,
    Connect(Addr),
    CancelConnect(Addr),
    DiscoverServices(Vec<Uuid>),
    DiscoverCharacteristics(Vec<Uuid>, Handle),
    DiscoverDescriptors(Handle),
    ReadCharacteristic(Handle),
    WriteCharacteristic(Handle, Vec<u8>, bool),
    ReadDescriptor(Handle),
    WriteDescriptor(Handle, Vec<u8>),
    SetNotify(Handle, bool),
    ReadRssi,
}

pub(crate) type ReqRx = mpsc::UnboundedReceiver<Req>;

/// Receives the next request, failing the test if none arrives.
pub(crate) async fn next(rx: &mut ReqRx) -> Req {
    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        Ok(Some(r)) => r,
        Ok(None) => panic!("request channel closed"),
        Err(_) => panic!("no request"),
    }
}

/// Installs a test log subscriber.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

pub(crate) const HRS: Uuid = Uuid::uuid16(0x180D);
pub(crate) const BAS: Uuid = Uuid::uuid16(0x180F);
pub(crate) const HRM: Uuid = Uuid::uuid16(0x2A37);
pub(crate) const BSL: Uuid = Uuid::uuid16(0x2A38);
pub(crate) const HRCP: Uuid = Uuid::uuid16(0x2A39);
pub(crate) const LEVEL: Uuid = Uuid::uuid16(0x2A19);
pub(crate) const CCCD: Uuid = Uuid::uuid16(0x2902);

/// Mock central manager.
#[derive(Debug)]
pub(crate) struct MockCentral {
    state: SyncMutex<State>,
    peers: SyncMutex<HashMap<Addr, Arc<MockPeer>>>,
    tx: mpsc::UnboundedSender<Req>,
}

impl MockCentral {
    pub fn new() -> (Arc<Self>, ReqRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let c = Self {
            state: SyncMutex::new(State::PoweredOn),
            peers: SyncMutex::default(),
            tx,
        };
        (Arc::new(c), rx)
    }

    pub fn set_state(&self, s: State) {
        *self.state.lock() = s;
    }

    /// Creates a peer that the host remembers.
    pub fn add_peer(&self, addr: Addr) -> Arc<MockPeer> {
        let p = MockPeer::new(addr, self.tx.clone());
        self.peers.lock().insert(addr, Arc::clone(&p));
        p
    }

    fn send(&self, r: Req) {
        let _ = self.tx.send(r);
    }
}

impl Central for MockCentral {
    fn state(&self) -> State {
        *self.state.lock()
    }

    fn scan(&self, services: &[Uuid], allow_dup: bool) {
        self.send(Req::Scan {
            svcs: services.to_vec(),
            allow_dup,
        });
    }

    fn stop_scan(&self) {
        self.send(Req::StopScan);
    }

    fn retrieve_peripheral(&self, addr: Addr) -> Option<Arc<dyn Peripheral>> {
        let p = self.peers.lock().get(&addr).cloned()?;
        Some(p)
    }

    fn connect(&self, p: &dyn Peripheral) {
        self.send(Req::Connect(p.addr()));
    }

    fn cancel_connect(&self, p: &dyn Peripheral) {
        self.send(Req::CancelConnect(p.addr()));
    }
}

/// Mock peer with a fixed GATT database:
///
/// ```text
/// 1 HRS
///     2 HRM [NOTIFY]         3 CCCD
///     4 BSL [READ, INDICATE]
///     5 HRCP [WRITE, WRITE_WITHOUT_RESPONSE]
/// 6 BAS
///     7 LEVEL [READ, NOTIFY] 8 CCCD
/// ```
#[derive(Debug)]
pub(crate) struct MockPeer {
    addr: Addr,
    svcs: Vec<Service>,
    chrs: Vec<(Handle, Characteristic)>,
    dscs: Vec<(Handle, Descriptor)>,
    values: SyncMutex<HashMap<Handle, Vec<u8>>>,
    tx: mpsc::UnboundedSender<Req>,
}

impl MockPeer {
    pub fn new(addr: Addr, tx: mpsc::UnboundedSender<Req>) -> Arc<Self> {
        let svc = |h, uuid| Service {
            hdl: Handle(h),
            uuid,
        };
        let chr = |s, h, uuid, props| {
            let c = Characteristic {
                hdl: Handle(h),
                uuid,
                props,
            };
            (Handle(s), c)
        };
        let dsc = |c, h, uuid| (Handle(c), Descriptor { hdl: Handle(h), uuid });
        Arc::new(Self {
            addr,
            svcs: vec![svc(1, HRS), svc(6, BAS)],
            chrs: vec![
                chr(1, 2, HRM, Prop::NOTIFY),
                chr(1, 4, BSL, Prop::READ | Prop::INDICATE),
                chr(1, 5, HRCP, Prop::WRITE | Prop::WRITE_WITHOUT_RESPONSE),
                chr(6, 7, LEVEL, Prop::READ | Prop::NOTIFY),
            ],
            dscs: vec![dsc(2, 3, CCCD), dsc(7, 8, CCCD)],
            values: SyncMutex::new(HashMap::from([
                (Handle(4), vec![1]),
                (Handle(7), vec![90]),
                (Handle(3), vec![0, 0]),
            ])),
            tx,
        })
    }

    /// Returns the host characteristic with handle `h`.
    pub fn chr(&self, h: u64) -> Characteristic {
        (self.chrs.iter())
            .find_map(|(_, c)| (c.hdl == Handle(h)).then(|| c.clone()))
            .unwrap()
    }

    /// Returns the host descriptor with handle `h`.
    pub fn dsc(&self, h: u64) -> Descriptor {
        (self.dscs.iter())
            .find_map(|(_, d)| (d.hdl == Handle(h)).then(|| d.clone()))
            .unwrap()
    }

    fn svc(&self, h: Handle) -> Service {
        self.svcs.iter().find(|s| s.hdl == h).cloned().unwrap()
    }

    /// Returns the successful completion of request `r`, if the host reports
    /// one.
    pub fn complete(&self, r: &Req) -> Option<PeripheralEvent> {
        use PeripheralEvent::*;
        let v = |h: &Handle| self.values.lock().get(h).cloned().unwrap_or_default();
        Some(match *r {
            Req::DiscoverServices(_) => ServicesDiscovered(Ok(())),
            Req::DiscoverCharacteristics(_, h) => CharacteristicsDiscovered(self.svc(h), Ok(())),
            Req::DiscoverDescriptors(h) => DescriptorsDiscovered(self.chr(h.0), Ok(())),
            Req::ReadCharacteristic(h) => CharacteristicValue(self.chr(h.0), Ok(v(&h))),
            Req::WriteCharacteristic(h, ref b, with_rsp) => {
                self.values.lock().insert(h, b.clone());
                if !with_rsp {
                    return None;
                }
                CharacteristicWritten(self.chr(h.0), Ok(()))
            }
            Req::ReadDescriptor(h) => DescriptorValue(self.dsc(h.0), Ok(v(&h))),
            Req::WriteDescriptor(h, ref b) => {
                self.values.lock().insert(h, b.clone());
                DescriptorWritten(self.dsc(h.0), Ok(()))
            }
            Req::SetNotify(h, _) => NotifyStateChanged(self.chr(h.0), Ok(())),
            Req::ReadRssi => RssiRead(Ok(-60)),
            _ => return None,
        })
    }

    fn send(&self, r: Req) {
        let _ = self.tx.send(r);
    }
}

impl Peripheral for MockPeer {
    fn addr(&self) -> Addr {
        self.addr
    }

    fn name(&self) -> Option<String> {
        Some("Mock HRM".to_owned())
    }

    fn mtu(&self) -> u16 {
        185
    }

    fn discover_services(&self, filter: &[Uuid]) {
        self.send(Req::DiscoverServices(filter.to_vec()));
    }

    fn services(&self) -> Vec<Service> {
        self.svcs.clone()
    }

    fn discover_characteristics(&self, filter: &[Uuid], s: &Service) {
        self.send(Req::DiscoverCharacteristics(filter.to_vec(), s.hdl));
    }

    fn characteristics(&self, s: &Service) -> Vec<Characteristic> {
        (self.chrs.iter())
            .filter(|(p, _)| *p == s.hdl)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn discover_descriptors(&self, c: &Characteristic) {
        self.send(Req::DiscoverDescriptors(c.hdl));
    }

    fn descriptors(&self, c: &Characteristic) -> Vec<Descriptor> {
        (self.dscs.iter())
            .filter(|(p, _)| *p == c.hdl)
            .map(|(_, d)| d.clone())
            .collect()
    }

    fn read_characteristic(&self, c: &Characteristic) {
        self.send(Req::ReadCharacteristic(c.hdl));
    }

    fn write_characteristic(&self, c: &Characteristic, v: &[u8], with_rsp: bool) {
        self.send(Req::WriteCharacteristic(c.hdl, v.to_vec(), with_rsp));
    }

    fn read_descriptor(&self, d: &Descriptor) {
        self.send(Req::ReadDescriptor(d.hdl));
    }

    fn write_descriptor(&self, d: &Descriptor, v: &[u8]) {
        self.send(Req::WriteDescriptor(d.hdl, v.to_vec()));
    }

    fn set_notify(&self, c: &Characteristic, enable: bool) {
        self.send(Req::SetNotify(c.hdl, enable));
    }

    fn read_rssi(&self) {
        self.send(Req::ReadRssi);
    }
}

/// Connected client driven by a mock peer.
pub(crate) struct Link {
    pub client: Client,
    pub conn: Arc<Conn>,
    pub central: Arc<MockCentral>,
    pub peer: Arc<MockPeer>,
    pub rx: ReqRx,
}

impl Link {
    pub fn new() -> Self {
        init_tracing();
        let (central, rx) = MockCentral::new();
        let peer = central.add_peer(Addr::new(0x1234));
        let conn = Conn::new(Arc::clone(&peer) as _);
        let client = Client::new(Arc::clone(&conn), Arc::clone(&central) as _);
        Self {
            client,
            conn,
            central,
            peer,
            rx,
        }
    }

    /// Receives the next request.
    pub async fn next(&mut self) -> Req {
        next(&mut self.rx).await
    }

    /// Delivers a host callback.
    pub fn reply(&self, evt: PeripheralEvent) {
        self.conn.handle(evt);
    }

    /// Completes every request successfully until task `t` finishes.
    pub async fn serve<T>(&mut self, mut t: JoinHandle<T>) -> T {
        loop {
            tokio::select! {
                r = &mut t => return r.unwrap(),
                Some(r) = self.rx.recv() => {
                    if let Some(evt) = self.peer.complete(&r) {
                        self.conn.handle(evt);
                    }
                }
            }
        }
    }
}
