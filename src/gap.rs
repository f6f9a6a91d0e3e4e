//! Generic Access Profile ([Vol 3] Part C) types reported by the host.

pub use {adv::*, uuid::*};

mod adv;
mod uuid;
