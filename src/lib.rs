//! Blackrock Bluetooth LE central bridge.
//!
//! Turns a callback-driven central-role host stack (such as CoreBluetooth),
//! which reports completions without any request identifier, into a
//! per-operation GATT client. Each [`gatt::Client`] call registers a one-shot
//! completion slot, issues the native request, and suspends until the host
//! callback for that slot arrives. Host glue feeds callbacks into
//! [`dev::Device::handle`] and [`dev::Device::handle_peripheral`].

pub use error::*;

pub mod dev;
pub mod gap;
pub mod gatt;
pub mod host;
pub mod le;

mod error;

type SyncMutex<T> = parking_lot::Mutex<T>;
