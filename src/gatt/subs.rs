use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::SyncMutex;

use super::*;

/// Notification or indication handler. It is called on the host callback
/// thread, in the order in which the host delivers values, and must not block.
#[derive(Clone)]
#[repr(transparent)]
pub struct NotifyHandler(Arc<dyn Fn(&[u8]) + Send + Sync>);

impl NotifyHandler {
    #[inline(always)]
    pub(crate) fn call(&self, v: &[u8]) {
        (self.0)(v);
    }
}

impl Debug for NotifyHandler {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple("NotifyHandler").field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T: Fn(&[u8]) + Send + Sync + 'static> From<T> for NotifyHandler {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Registered subscription. Entries are inserted inactive and become active
/// when the host confirms the notification state change.
#[derive(Debug)]
struct Sub {
    chr: Characteristic,
    f: NotifyHandler,
    active: bool,
}

/// Per-connection map of characteristic identities to notification handlers.
/// Iteration order is entity creation order.
#[derive(Debug, Default)]
pub(super) struct SubscriptionTable(SyncMutex<BTreeMap<EntityId, Sub>>);

impl SubscriptionTable {
    /// Inserts an inactive subscription, replacing any existing one for `c`.
    pub fn insert(&self, c: &Characteristic, f: NotifyHandler) {
        let sub = Sub {
            chr: c.clone(),
            f,
            active: false,
        };
        self.0.lock().insert(c.id(), sub);
    }

    /// Activates inactive subscriptions for any of `ids`. Returns the number of
    /// activated entries.
    pub fn activate(&self, ids: &[EntityId]) -> usize {
        let mut subs = self.0.lock();
        let mut n = 0;
        for id in ids {
            let Some(sub) = subs.get_mut(id) else {
                continue;
            };
            if !sub.active {
                sub.active = true;
                n += 1;
            }
        }
        n
    }

    /// Removes the subscription for `c`.
    pub fn remove(&self, c: &Characteristic) -> bool {
        self.0.lock().remove(&c.id()).is_some()
    }

    /// Returns whether `c` has an active subscription.
    pub fn is_active(&self, c: &Characteristic) -> bool {
        self.0.lock().get(&c.id()).map_or(false, |s| s.active)
    }

    /// Returns a snapshot of characteristics with active subscriptions.
    pub fn active(&self) -> Vec<Characteristic> {
        (self.0.lock().values())
            .filter(|s| s.active)
            .map(|s| s.chr.clone())
            .collect()
    }

    /// Returns the handlers of active subscriptions for any of `ids`.
    pub fn handlers(&self, ids: &[EntityId]) -> SmallVec<[NotifyHandler; 1]> {
        let subs = self.0.lock();
        (ids.iter().filter_map(|id| subs.get(id)))
            .filter(|s| s.active)
            .map(|s| s.f.clone())
            .collect()
    }
}
