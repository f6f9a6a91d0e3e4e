use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::gap::Uuid;
use crate::SyncMutex;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

/// Allocation identity of a discovered entity. Two entities with the same UUID
/// (for example, the same characteristic type in two services) always have
/// different identities.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Returns a process-wide unique identity.
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        match NonZeroU64::new(NEXT.fetch_add(1, Ordering::Relaxed)) {
            Some(id) => Self(id),
            None => unreachable!("entity identity overflow"),
        }
    }
}

/// Kind of GATT entity.
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityKind {
    Service,
    Characteristic,
    Descriptor,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Service => "service",
            Self::Characteristic => "characteristic",
            Self::Descriptor => "descriptor",
        })
    }
}

/// Common interface of discovered entities.
pub trait Entity {
    const KIND: EntityKind;

    /// Returns the entity identity.
    fn id(&self) -> EntityId;

    /// Returns the entity type.
    fn uuid(&self) -> Uuid;
}

/// Implements identity equality and the [`Entity`] trait for a handle type.
macro_rules! entity {
    ($($t:ident)*) => {$(
        impl Entity for $t {
            const KIND: EntityKind = EntityKind::$t;

            #[inline(always)]
            fn id(&self) -> EntityId {
                self.0.id
            }

            #[inline(always)]
            fn uuid(&self) -> Uuid {
                self.0.uuid
            }
        }

        impl PartialEq for $t {
            #[inline(always)]
            fn eq(&self, rhs: &Self) -> bool {
                self.0.id == rhs.0.id
            }
        }

        impl Eq for $t {}
    )*}
}

entity!(Service Characteristic Descriptor);

/// Discovered primary service. Clones refer to the same service.
#[derive(Clone)]
pub struct Service(Arc<SvcInner>);

struct SvcInner {
    id: EntityId,
    uuid: Uuid,
    chars: SyncMutex<Vec<Characteristic>>,
}

impl Service {
    pub(crate) fn new(uuid: Uuid) -> Self {
        Self(Arc::new(SvcInner {
            id: EntityId::next(),
            uuid,
            chars: SyncMutex::default(),
        }))
    }

    /// Returns the characteristics discovered so far.
    #[must_use]
    pub fn characteristics(&self) -> Vec<Characteristic> {
        self.0.chars.lock().clone()
    }

    /// Returns the first characteristic of type `uuid`.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        (self.0.chars.lock().iter())
            .find(|c| c.uuid() == uuid)
            .cloned()
    }

    /// Appends newly discovered characteristics and returns the full list.
    pub(crate) fn extend(&self, cs: Vec<Characteristic>) -> Vec<Characteristic> {
        let mut chars = self.0.chars.lock();
        chars.extend(cs);
        chars.clone()
    }
}

impl Debug for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct("Service"))
            .field("id", &self.0.id)
            .field("uuid", &self.0.uuid)
            .finish_non_exhaustive()
    }
}

/// Discovered characteristic. Clones refer to the same characteristic and
/// share its cached value.
#[derive(Clone)]
pub struct Characteristic(Arc<ChrInner>);

struct ChrInner {
    id: EntityId,
    uuid: Uuid,
    props: Prop,
    value: SyncMutex<Vec<u8>>,
    descs: SyncMutex<Vec<Descriptor>>,
}

impl Characteristic {
    pub(crate) fn new(uuid: Uuid, props: Prop) -> Self {
        Self(Arc::new(ChrInner {
            id: EntityId::next(),
            uuid,
            props,
            value: SyncMutex::default(),
            descs: SyncMutex::default(),
        }))
    }

    /// Returns the characteristic properties.
    #[inline(always)]
    #[must_use]
    pub fn props(&self) -> Prop {
        self.0.props
    }

    /// Returns the last value read from the server.
    #[must_use]
    pub fn value(&self) -> Vec<u8> {
        self.0.value.lock().clone()
    }

    /// Returns the descriptors discovered so far.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.0.descs.lock().clone()
    }

    /// Returns the first descriptor of type `uuid`.
    #[must_use]
    pub fn descriptor(&self, uuid: Uuid) -> Option<Descriptor> {
        (self.0.descs.lock().iter())
            .find(|d| d.uuid() == uuid)
            .cloned()
    }

    #[inline]
    pub(crate) fn set_value(&self, v: &[u8]) {
        let mut value = self.0.value.lock();
        value.clear();
        value.extend_from_slice(v);
    }

    /// Appends newly discovered descriptors and returns the full list.
    pub(crate) fn extend(&self, ds: Vec<Descriptor>) -> Vec<Descriptor> {
        let mut descs = self.0.descs.lock();
        descs.extend(ds);
        descs.clone()
    }
}

impl Debug for Characteristic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct("Characteristic"))
            .field("id", &self.0.id)
            .field("uuid", &self.0.uuid)
            .field("props", &self.0.props)
            .finish_non_exhaustive()
    }
}

/// Discovered characteristic descriptor.
#[derive(Clone)]
pub struct Descriptor(Arc<DscInner>);

struct DscInner {
    id: EntityId,
    uuid: Uuid,
    value: SyncMutex<Vec<u8>>,
}

impl Descriptor {
    pub(crate) fn new(uuid: Uuid) -> Self {
        Self(Arc::new(DscInner {
            id: EntityId::next(),
            uuid,
            value: SyncMutex::default(),
        }))
    }

    /// Returns the last value read from the server.
    #[must_use]
    pub fn value(&self) -> Vec<u8> {
        self.0.value.lock().clone()
    }

    #[inline]
    pub(crate) fn set_value(&self, v: &[u8]) {
        let mut value = self.0.value.lock();
        value.clear();
        value.extend_from_slice(v);
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_struct("Descriptor"))
            .field("id", &self.0.id)
            .field("uuid", &self.0.uuid)
            .finish_non_exhaustive()
    }
}

/// Services discovered on a server.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    services: Vec<Service>,
}

impl Profile {
    #[inline]
    pub(crate) fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Returns all services in discovery order.
    #[inline(always)]
    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Returns the first service of type `uuid`.
    #[must_use]
    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid() == uuid)
    }

    /// Returns the first characteristic of type `uuid` in any service.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        self.services.iter().find_map(|s| s.characteristic(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity() {
        let u = Uuid::uuid16(0x2A37);
        let (a, b) = (Characteristic::new(u, Prop::NOTIFY), Characteristic::new(u, Prop::NOTIFY));
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a, a.clone());

        a.set_value(&[1, 2]);
        assert_eq!(a.clone().value(), [1, 2]);
        assert!(b.value().is_empty());
    }

    #[test]
    fn lookup() {
        let s = Service::new(Uuid::uuid16(0x180D));
        let hrm = Characteristic::new(Uuid::uuid16(0x2A37), Prop::NOTIFY);
        let loc = Characteristic::new(Uuid::uuid16(0x2A38), Prop::READ);
        assert_eq!(s.extend(vec![hrm.clone()]).len(), 1);
        assert_eq!(s.extend(vec![loc.clone()]), [hrm.clone(), loc.clone()]);

        let p = Profile::new(vec![s.clone()]);
        assert_eq!(p.service(Uuid::uuid16(0x180D)), Some(&s));
        assert_eq!(p.characteristic(Uuid::uuid16(0x2A38)), Some(loc));
        assert_eq!(p.characteristic(Uuid::uuid16(0x2A39)), None);
    }
}
