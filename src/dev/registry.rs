use std::collections::HashMap;
use std::sync::Arc;

use crate::gatt::Conn;
use crate::le::Addr;
use crate::{Error, Result, SyncMutex};

/// Live connections indexed by peer address.
#[derive(Debug, Default)]
pub(super) struct Registry(SyncMutex<HashMap<Addr, Arc<Conn>>>);

impl Registry {
    /// Adds a new connection. An existing connection to the same peer is never
    /// replaced.
    pub fn insert(&self, c: Arc<Conn>) -> Result<()> {
        use std::collections::hash_map::Entry;
        match self.0.lock().entry(c.addr()) {
            Entry::Occupied(_) => Err(Error::DuplicateConnection(c.addr())),
            Entry::Vacant(e) => {
                e.insert(c);
                Ok(())
            }
        }
    }

    /// Returns the connection to `addr`.
    #[inline]
    pub fn get(&self, addr: Addr) -> Option<Arc<Conn>> {
        self.0.lock().get(&addr).cloned()
    }

    /// Removes the connection to `addr`.
    #[inline]
    pub fn remove(&self, addr: Addr) -> Option<Arc<Conn>> {
        self.0.lock().remove(&addr)
    }

    /// Removes all connections.
    pub fn drain(&self) -> Vec<Arc<Conn>> {
        self.0.lock().drain().map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;
    use crate::host::mock::MockCentral;

    #[test]
    fn no_duplicates() {
        let (central, _rx) = MockCentral::new();
        let (a, b) = (Addr::new(1), Addr::new(2));
        let reg = Registry::default();
        let first = Conn::new(central.add_peer(a));
        reg.insert(Arc::clone(&first)).unwrap();
        assert_matches!(
            reg.insert(Conn::new(central.add_peer(a))),
            Err(Error::DuplicateConnection(addr)) if addr == a
        );
        assert!(Arc::ptr_eq(&reg.get(a).unwrap(), &first));
        reg.insert(Conn::new(central.add_peer(b))).unwrap();

        assert!(Arc::ptr_eq(&reg.remove(a).unwrap(), &first));
        assert!(reg.get(a).is_none());
        assert!(reg.remove(a).is_none());
        assert_eq!(reg.drain().len(), 1);
        assert!(reg.get(b).is_none());
    }
}
