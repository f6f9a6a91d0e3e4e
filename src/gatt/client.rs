use std::sync::Arc;

use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::debug;

use crate::gap::Uuid;
use crate::host::Central;
use crate::le::Addr;
use crate::{Error, Result, Stage};

use super::*;

/// GATT client for one connection. Clones share the connection.
///
/// Every request suspends until the host reports its completion. Apart from
/// disconnection, which fails all outstanding requests, there is no timeout.
#[derive(Clone, Debug)]
pub struct Client {
    conn: Arc<Conn>,
    central: Arc<dyn Central>,
}

impl Client {
    #[inline]
    pub(crate) fn new(conn: Arc<Conn>, central: Arc<dyn Central>) -> Self {
        Self { conn, central }
    }

    /// Returns the peer address.
    #[inline(always)]
    #[must_use]
    pub fn addr(&self) -> Addr {
        self.conn.addr()
    }

    /// Returns the peer name reported by the host.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.conn.peer().name()
    }

    /// Returns the most recently discovered profile.
    #[must_use]
    pub fn profile(&self) -> Option<Arc<Profile>> {
        self.conn.profile.lock().clone()
    }

    /// Discovers the complete profile of the server. A cached profile is
    /// returned without any requests unless `force` is set.
    ///
    /// A failure at any stage aborts the walk. Entities discovered up to that
    /// point remain usable.
    pub async fn discover_profile(&self, force: bool) -> Result<Arc<Profile>> {
        if !force {
            if let Some(p) = self.profile() {
                return Ok(p);
            }
        }
        let svcs = (self.find_services(&[]).await).map_err(|e| Stage::Services.wrap(e))?;
        {
            let mut p = self.conn.profile.lock();
            if p.is_none() {
                *p = Some(Arc::new(Profile::new(svcs.clone())));
            }
        }
        for s in &svcs {
            let cs = (self.discover_characteristics(&[], s).await)
                .map_err(|e| Stage::Characteristics.wrap(e))?;
            for c in &cs {
                (self.discover_descriptors(&[], c).await)
                    .map_err(|e| Stage::Descriptors.wrap(e))?;
            }
        }
        let p = Arc::new(Profile::new(svcs));
        *self.conn.profile.lock() = Some(Arc::clone(&p));
        debug!("Discovered profile of {}", self.addr());
        Ok(p)
    }

    /// Discovers primary services, optionally restricted to the types in
    /// `filter`. New services are added to the profile.
    pub async fn discover_services(&self, filter: &[Uuid]) -> Result<Vec<Service>> {
        let svcs = self.find_services(filter).await?;
        let mut p = self.conn.profile.lock();
        let all = match p.as_deref() {
            Some(old) => (old.services().iter().cloned())
                .chain(svcs.iter().cloned())
                .collect(),
            None => svcs.clone(),
        };
        *p = Some(Arc::new(Profile::new(all)));
        Ok(svcs)
    }

    /// Included service discovery is not implemented.
    pub async fn discover_included_services(
        &self,
        filter: &[Uuid],
        s: &Service,
    ) -> Result<Vec<Service>> {
        let _ = (filter, s);
        Err(Error::NotImplemented)
    }

    /// Discovers characteristics of service `s`, optionally restricted to the
    /// types in `filter`. Returns all characteristics of `s` discovered so far.
    pub async fn discover_characteristics(
        &self,
        filter: &[Uuid],
        s: &Service,
    ) -> Result<Vec<Characteristic>> {
        let n = self.conn.cache.resolve(s)?;
        (self.conn)
            .request(Class::CharacteristicsDiscovered, |p| {
                p.discover_characteristics(filter, &n);
            })
            .await?;
        let cs = (self.conn.peer().characteristics(&n).into_iter())
            .filter(|n| selected(filter, n.uuid))
            .map(|n| {
                let c = Characteristic::new(n.uuid, n.props);
                self.conn.cache.register(&c, n);
                c
            })
            .collect();
        Ok(s.extend(cs))
    }

    /// Discovers descriptors of characteristic `c`. The host always discovers
    /// all descriptors, so a non-empty `filter` only restricts which ones are
    /// added. Returns all descriptors of `c` discovered so far.
    pub async fn discover_descriptors(
        &self,
        filter: &[Uuid],
        c: &Characteristic,
    ) -> Result<Vec<Descriptor>> {
        let n = self.conn.cache.resolve(c)?;
        (self.conn)
            .request(Class::DescriptorsDiscovered, |p| p.discover_descriptors(&n))
            .await?;
        let ds = (self.conn.peer().descriptors(&n).into_iter())
            .filter(|n| selected(filter, n.uuid))
            .map(|n| {
                let d = Descriptor::new(n.uuid);
                self.conn.cache.register(&d, n);
                d
            })
            .collect();
        Ok(c.extend(ds))
    }

    /// Reads the value of characteristic `c` and stores it as the cached
    /// value. Only one read of `c` may be outstanding.
    pub async fn read_characteristic(&self, c: &Characteristic) -> Result<Vec<u8>> {
        let n = self.conn.cache.resolve(c)?;
        let mut rd = self.conn.demux.register(c)?;
        self.conn.peer().read_characteristic(&n);
        let v = rd.wait().await?;
        c.set_value(&v);
        Ok(v)
    }

    /// Reads a long characteristic value. The host performs long reads
    /// transparently, so this is the same as [`Self::read_characteristic`].
    #[inline]
    pub async fn read_long_characteristic(&self, c: &Characteristic) -> Result<Vec<u8>> {
        self.read_characteristic(c).await
    }

    /// Writes the value of characteristic `c`. A write without response
    /// returns as soon as the request is submitted.
    pub async fn write_characteristic(
        &self,
        c: &Characteristic,
        v: &[u8],
        no_rsp: bool,
    ) -> Result<()> {
        let n = self.conn.cache.resolve(c)?;
        if no_rsp {
            self.conn.ensure_open()?;
            self.conn.peer().write_characteristic(&n, v, false);
            return Ok(());
        }
        (self.conn)
            .request(Class::CharacteristicWritten, |p| {
                p.write_characteristic(&n, v, true);
            })
            .await
            .map(drop)
    }

    /// Reads the value of descriptor `d` and stores it as the cached value.
    pub async fn read_descriptor(&self, d: &Descriptor) -> Result<Vec<u8>> {
        let n = self.conn.cache.resolve(d)?;
        let v = (self.conn)
            .request(Class::DescriptorRead, |p| p.read_descriptor(&n))
            .await?
            .into_value();
        d.set_value(&v);
        Ok(v)
    }

    /// Writes the value of descriptor `d`.
    pub async fn write_descriptor(&self, d: &Descriptor, v: &[u8]) -> Result<()> {
        let n = self.conn.cache.resolve(d)?;
        (self.conn)
            .request(Class::DescriptorWritten, |p| p.write_descriptor(&n, v))
            .await
            .map(drop)
    }

    /// Reads the RSSI of the connection. Any failure is reported as 0, which
    /// is also a valid reading.
    pub async fn read_rssi(&self) -> i16 {
        match self.conn.request(Class::RssiRead, |p| p.read_rssi()).await {
            Ok(v) => v.rssi(),
            Err(e) => {
                debug!("Reporting RSSI of {} as 0: {e}", self.addr());
                0
            }
        }
    }

    /// Returns the current ATT MTU. The host negotiates the MTU on its own,
    /// so the requested value is ignored.
    pub fn exchange_mtu(&self, mtu: u16) -> Result<u16> {
        let _ = mtu;
        self.conn.ensure_open()?;
        Ok(self.conn.peer().mtu())
    }

    /// Enables notifications or indications of characteristic `c`. The host
    /// chooses between the two, so `ind` has no effect. Handler `f` receives
    /// every value update that does not complete a read.
    pub async fn subscribe(
        &self,
        c: &Characteristic,
        ind: bool,
        f: impl Into<NotifyHandler>,
    ) -> Result<()> {
        let _ = ind;
        let n = self.conn.cache.resolve(c)?;
        let f = f.into();
        let r = (self.conn)
            .request(Class::NotifyStateChanged, |p| {
                self.conn.subs.insert(c, f);
                p.set_notify(&n, true);
            })
            .await;
        if let Err(e) = r {
            self.conn.subs.remove(c);
            return Err(e);
        }
        Ok(())
    }

    /// Disables notifications or indications of characteristic `c`. The
    /// subscription remains active if the host reports an error.
    pub async fn unsubscribe(&self, c: &Characteristic, ind: bool) -> Result<()> {
        let _ = ind;
        let n = self.conn.cache.resolve(c)?;
        (self.conn)
            .request(Class::NotifyStateChanged, |p| p.set_notify(&n, false))
            .await?;
        self.conn.subs.remove(c);
        Ok(())
    }

    /// Returns whether characteristic `c` has an active subscription.
    #[must_use]
    pub fn is_subscribed(&self, c: &Characteristic) -> bool {
        self.conn.subs.is_active(c)
    }

    /// Removes all active subscriptions in discovery order, stopping at the
    /// first error.
    pub async fn clear_subscriptions(&self) -> Result<()> {
        for c in self.conn.subs.active() {
            self.unsubscribe(&c, false).await?;
        }
        Ok(())
    }

    /// Requests disconnection. Outstanding requests fail when the host
    /// reports the disconnect.
    pub fn cancel_connection(&self) -> Result<()> {
        self.conn.disconnecting()?;
        self.central.cancel_connect(self.conn.peer());
        Ok(())
    }

    /// Returns a future that resolves when the connection is closed.
    #[inline]
    pub fn disconnected(&self) -> WaitForCancellationFutureOwned {
        self.conn.closed()
    }

    /// Finds services without modifying the profile.
    async fn find_services(&self, filter: &[Uuid]) -> Result<Vec<Service>> {
        (self.conn)
            .request(Class::ServicesDiscovered, |p| p.discover_services(filter))
            .await?;
        Ok((self.conn.peer().services().into_iter())
            .filter(|n| selected(filter, n.uuid))
            .map(|n| {
                let s = Service::new(n.uuid);
                self.conn.cache.register(&s, n);
                s
            })
            .collect())
    }
}

/// Returns whether `u` passes `filter`. An empty filter matches everything.
#[inline]
fn selected(filter: &[Uuid], u: Uuid) -> bool {
    filter.is_empty() || filter.contains(&u)
}
