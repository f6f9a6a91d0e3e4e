use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::trace;

use crate::{host, Error, Result, SyncMutex};

use super::subs::SubscriptionTable;
use super::*;

/// Destination of a characteristic value update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Delivery {
    /// Completed a pending read.
    Reader,
    /// Passed to this many subscription handlers.
    Notified(usize),
    /// No reader or active subscription.
    Dropped,
}

/// Demultiplexer of characteristic value updates. The host reports read
/// responses and notifications with the same callback, so a registered reader
/// claims the next update for its characteristic, and all other updates go to
/// the subscription table.
#[derive(Debug, Default)]
pub(super) struct ReadDemux(SyncMutex<Readers>);

#[derive(Debug, Default)]
struct Readers {
    map: HashMap<EntityId, Reader>,
    next_seq: u64,
    closed: bool,
}

#[derive(Debug)]
struct Reader {
    seq: u64,
    tx: oneshot::Sender<Result<Vec<u8>>>,
}

impl ReadDemux {
    /// Registers a reader for `c`. Only one read per characteristic may be
    /// outstanding.
    pub fn register(&self, c: &Characteristic) -> Result<PendingRead> {
        let mut rs = self.0.lock();
        if rs.closed {
            return Err(Error::Disconnected);
        }
        if rs.map.contains_key(&c.id()) {
            return Err(Error::AlreadyPending(c.uuid()));
        }
        let seq = rs.next_seq;
        rs.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        rs.map.insert(c.id(), Reader { seq, tx });
        Ok(PendingRead {
            demux: self,
            id: c.id(),
            seq,
            rx,
        })
    }

    /// Removes the reader registration `seq` for `id`, unless it was already
    /// consumed or replaced by a newer one.
    fn unregister(&self, id: EntityId, seq: u64) {
        let mut rs = self.0.lock();
        if rs.map.get(&id).map_or(false, |r| r.seq == seq) {
            rs.map.remove(&id);
        }
    }

    /// Routes a value update for any of characteristic identities `ids`.
    /// Errors are only meaningful to readers and are otherwise dropped.
    pub fn dispatch(
        &self,
        subs: &SubscriptionTable,
        ids: &[EntityId],
        r: host::Result<Vec<u8>>,
    ) -> Delivery {
        let rd = {
            let mut rs = self.0.lock();
            ids.iter().find_map(|id| rs.map.remove(id))
        };
        if let Some(rd) = rd {
            let _ = rd.tx.send(r.map_err(Error::from));
            return Delivery::Reader;
        }
        let v = match r {
            Ok(v) => v,
            Err(e) => {
                trace!("Dropped characteristic error without a reader: {e}");
                return Delivery::Dropped;
            }
        };
        let fs = subs.handlers(ids);
        if fs.is_empty() {
            trace!("Dropped characteristic value without a destination: {v:02X?}");
            return Delivery::Dropped;
        }
        for f in &fs {
            f.call(&v);
        }
        Delivery::Notified(fs.len())
    }

    /// Fails all readers with [`Error::Disconnected`] and rejects new ones.
    pub fn close(&self) {
        let rds: Vec<Reader> = {
            let mut rs = self.0.lock();
            rs.closed = true;
            rs.map.drain().map(|(_, rd)| rd).collect()
        };
        for rd in rds {
            let _ = rd.tx.send(Err(Error::Disconnected));
        }
    }
}

/// Pending characteristic read. The registration is removed when this is
/// dropped.
#[derive(Debug)]
#[must_use]
pub(super) struct PendingRead<'a> {
    demux: &'a ReadDemux,
    id: EntityId,
    seq: u64,
    rx: oneshot::Receiver<Result<Vec<u8>>>,
}

impl PendingRead<'_> {
    /// Waits for the read response.
    pub async fn wait(&mut self) -> Result<Vec<u8>> {
        (&mut self.rx).await.unwrap_or(Err(Error::Disconnected))
    }
}

impl Drop for PendingRead<'_> {
    #[inline]
    fn drop(&mut self) {
        self.demux.unregister(self.id, self.seq);
    }
}
