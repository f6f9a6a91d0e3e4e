use std::collections::HashMap;

use smallvec::SmallVec;

use crate::{host, Error, Result, SyncMutex};

use super::*;

/// Characteristic identities registered for one host characteristic. A forced
/// rediscovery creates new entities for the same host object.
pub(super) type ChrIds = SmallVec<[EntityId; 1]>;

/// Per-connection map of discovered entities to their host objects.
#[derive(Debug, Default)]
pub(super) struct ProfileCache(SyncMutex<Maps>);

#[derive(Debug, Default)]
pub(super) struct Maps {
    svc: HashMap<EntityId, host::Service>,
    chr: HashMap<EntityId, host::Characteristic>,
    dsc: HashMap<EntityId, host::Descriptor>,
    chr_ids: HashMap<host::Handle, ChrIds>,
}

impl ProfileCache {
    /// Associates entity `e` with host object `n`.
    pub fn register<E: Cached>(&self, e: &E, n: E::Native) {
        let mut m = self.0.lock();
        E::on_register(&mut m, e.id(), &n);
        E::map(&mut m).insert(e.id(), n);
    }

    /// Returns the host object for entity `e`. Entities that were not
    /// discovered through this cache are not found.
    pub fn resolve<E: Cached>(&self, e: &E) -> Result<E::Native> {
        let mut m = self.0.lock();
        (E::map(&mut m).get(&e.id()).cloned()).ok_or(Error::EntityNotFound {
            kind: E::KIND,
            uuid: e.uuid(),
        })
    }

    /// Returns all characteristic identities registered for host
    /// characteristic `hdl`.
    pub fn characteristic_ids(&self, hdl: host::Handle) -> ChrIds {
        (self.0.lock().chr_ids.get(&hdl).cloned()).unwrap_or_default()
    }
}

/// Entity with a host object counterpart.
pub(super) trait Cached: Entity {
    type Native: Clone;

    /// Returns the map of this entity type.
    fn map(m: &mut Maps) -> &mut HashMap<EntityId, Self::Native>;

    /// Updates secondary indices when an entity is registered.
    #[inline(always)]
    fn on_register(m: &mut Maps, id: EntityId, n: &Self::Native) {
        let _ = (m, id, n);
    }
}

impl Cached for Service {
    type Native = host::Service;

    #[inline(always)]
    fn map(m: &mut Maps) -> &mut HashMap<EntityId, Self::Native> {
        &mut m.svc
    }
}

impl Cached for Characteristic {
    type Native = host::Characteristic;

    #[inline(always)]
    fn map(m: &mut Maps) -> &mut HashMap<EntityId, Self::Native> {
        &mut m.chr
    }

    fn on_register(m: &mut Maps, id: EntityId, n: &Self::Native) {
        let ids = m.chr_ids.entry(n.hdl).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

impl Cached for Descriptor {
    type Native = host::Descriptor;

    #[inline(always)]
    fn map(m: &mut Maps) -> &mut HashMap<EntityId, Self::Native> {
        &mut m.dsc
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;
    use crate::gap::Uuid;

    fn native(hdl: u64, uuid: Uuid) -> host::Characteristic {
        host::Characteristic {
            hdl: host::Handle(hdl),
            uuid,
            props: Prop::READ,
        }
    }

    #[test]
    fn identity_keys() {
        let pc = ProfileCache::default();
        let u = Uuid::uuid16(0x2A19);
        // Same UUID in two services
        let (a, b) = (Characteristic::new(u, Prop::READ), Characteristic::new(u, Prop::READ));
        pc.register(&a, native(1, u));
        pc.register(&b, native(2, u));
        assert_eq!(pc.resolve(&a).unwrap().hdl, host::Handle(1));
        assert_eq!(pc.resolve(&b).unwrap().hdl, host::Handle(2));

        let stranger = Characteristic::new(u, Prop::READ);
        assert_matches!(
            pc.resolve(&stranger),
            Err(Error::EntityNotFound {
                kind: EntityKind::Characteristic,
                ..
            })
        );
        assert_matches!(
            ProfileCache::default().resolve(&a),
            Err(Error::EntityNotFound { .. })
        );
    }

    #[test]
    fn reverse_index() {
        let pc = ProfileCache::default();
        let u = Uuid::uuid16(0x2A37);
        let (old, new) = (Characteristic::new(u, Prop::NOTIFY), Characteristic::new(u, Prop::NOTIFY));
        pc.register(&old, native(7, u));
        pc.register(&new, native(7, u));
        pc.register(&new, native(7, u));
        assert_eq!(pc.characteristic_ids(host::Handle(7)).as_slice(), &[old.id(), new.id()]);
        assert!(pc.characteristic_ids(host::Handle(8)).is_empty());

        let s = Service::new(Uuid::uuid16(0x180D));
        pc.register(&s, host::Service { hdl: host::Handle(1), uuid: s.uuid() });
        assert!(pc.characteristic_ids(host::Handle(1)).is_empty());
        assert_eq!(pc.resolve(&s).unwrap().uuid, s.uuid());
    }
}
