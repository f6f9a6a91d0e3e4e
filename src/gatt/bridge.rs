use std::fmt::{Display, Formatter};

use enum_iterator::Sequence;
use tokio::sync::oneshot;
use tracing::warn;

use crate::{Error, Result, SyncMutex};

/// Connection-wide operation class. Each class has a single completion slot
/// because the host reports these completions without identifying the
/// request, and ATT allows only one outstanding request per bearer.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
#[repr(usize)]
pub enum Class {
    ServicesDiscovered,
    CharacteristicsDiscovered,
    DescriptorsDiscovered,
    CharacteristicWritten,
    DescriptorRead,
    DescriptorWritten,
    NotifyStateChanged,
    RssiRead,
}

impl Class {
    /// Number of classes.
    pub(crate) const COUNT: usize = Self::RssiRead as usize + 1;
}

impl Display for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::ServicesDiscovered => "service discovery",
            Self::CharacteristicsDiscovered => "characteristic discovery",
            Self::DescriptorsDiscovered => "descriptor discovery",
            Self::CharacteristicWritten => "characteristic write",
            Self::DescriptorRead => "descriptor read",
            Self::DescriptorWritten => "descriptor write",
            Self::NotifyStateChanged => "notification state",
            Self::RssiRead => "RSSI read",
        })
    }
}

/// Completion payload. Most classes only report success.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Outcome {
    Done,
    Value(Vec<u8>),
    Rssi(i16),
}

impl Outcome {
    #[inline]
    pub fn into_value(self) -> Vec<u8> {
        match self {
            Self::Value(v) => v,
            _ => Vec::new(),
        }
    }

    #[inline]
    pub fn rssi(&self) -> i16 {
        match *self {
            Self::Rssi(v) => v,
            _ => 0,
        }
    }
}

type Sender = oneshot::Sender<Result<Outcome>>;

/// Per-connection single-slot completion channels.
#[derive(Debug, Default)]
pub(super) struct EventBridge(SyncMutex<Slots>);

#[derive(Debug, Default)]
struct Slots {
    tx: [Option<Sender>; Class::COUNT],
    closed: bool,
}

impl EventBridge {
    /// Registers a waiter for the next completion of class `c`. This must be
    /// called before the native request is issued, so that a completion
    /// delivered immediately is not lost.
    pub fn issue(&self, c: Class) -> Result<Pending> {
        let mut s = self.0.lock();
        if s.closed {
            return Err(Error::Disconnected);
        }
        let slot = &mut s.tx[c as usize];
        if slot.as_ref().map_or(false, |tx| !tx.is_closed()) {
            return Err(Error::Busy(c));
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(Pending(rx))
    }

    /// Completes the waiter of class `c`. Returns `false` if there was no
    /// waiter.
    pub fn fulfill(&self, c: Class, r: Result<Outcome>) -> bool {
        let tx = self.0.lock().tx[c as usize].take();
        match tx.map(|tx| tx.send(r)) {
            Some(Ok(())) => true,
            _ => {
                warn!("Ignored {c} completion without a waiter");
                false
            }
        }
    }

    /// Releases all waiters with [`Error::Disconnected`] and rejects future
    /// requests.
    pub fn close(&self) {
        let tx: Vec<Sender> = {
            let mut s = self.0.lock();
            s.closed = true;
            s.tx.iter_mut().filter_map(Option::take).collect()
        };
        for tx in tx {
            let _ = tx.send(Err(Error::Disconnected));
        }
    }
}

/// Outstanding request of one [`Class`].
#[derive(Debug)]
#[must_use]
pub(super) struct Pending(oneshot::Receiver<Result<Outcome>>);

impl Pending {
    /// Waits for the completion.
    pub async fn wait(self) -> Result<Outcome> {
        self.0.await.unwrap_or(Err(Error::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;
    use crate::host;

    #[tokio::test]
    async fn fulfill_once() {
        let b = EventBridge::default();
        let p = b.issue(Class::CharacteristicWritten).unwrap();
        assert!(b.fulfill(Class::CharacteristicWritten, Ok(Outcome::Done)));
        assert!(!b.fulfill(Class::CharacteristicWritten, Ok(Outcome::Done)));
        assert_eq!(p.wait().await.unwrap(), Outcome::Done);

        // Other classes are independent
        let p = b.issue(Class::RssiRead).unwrap();
        assert!(!b.fulfill(Class::DescriptorRead, Ok(Outcome::Value(vec![1]))));
        assert!(b.fulfill(Class::RssiRead, Ok(Outcome::Rssi(-40))));
        assert_eq!(p.wait().await.unwrap().rssi(), -40);
    }

    #[tokio::test]
    async fn host_error() {
        let b = EventBridge::default();
        let p = b.issue(Class::DescriptorWritten).unwrap();
        let e = host::Error::new(3, "write not permitted");
        b.fulfill(Class::DescriptorWritten, Err(e.clone().into()));
        assert_matches!(p.wait().await, Err(Error::Host(h)) if h == e);
    }

    #[tokio::test]
    async fn busy() {
        let b = EventBridge::default();
        let p = b.issue(Class::ServicesDiscovered).unwrap();
        assert_matches!(
            b.issue(Class::ServicesDiscovered),
            Err(Error::Busy(Class::ServicesDiscovered))
        );
        // An abandoned waiter frees the slot
        drop(p);
        let p = b.issue(Class::ServicesDiscovered).unwrap();
        assert!(b.fulfill(Class::ServicesDiscovered, Ok(Outcome::Done)));
        assert!(p.wait().await.is_ok());
    }

    #[tokio::test]
    async fn close_releases_all() {
        let b = EventBridge::default();
        let ps: Vec<Pending> = enum_iterator::all::<Class>()
            .map(|c| b.issue(c).unwrap())
            .collect();
        assert_eq!(ps.len(), Class::COUNT);
        b.close();
        for p in ps {
            assert_matches!(p.wait().await, Err(Error::Disconnected));
        }
        assert_matches!(b.issue(Class::RssiRead), Err(Error::Disconnected));
        assert!(!b.fulfill(Class::RssiRead, Ok(Outcome::Rssi(0))));
    }
}
