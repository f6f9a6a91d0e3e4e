//! Generic Attribute Profile client ([Vol 3] Part G).
//!
//! The host stack reports GATT completions without identifying the request.
//! Each [`Client`] request therefore registers a completion slot before it is
//! submitted: connection-wide operations use one slot per [`Class`], and
//! characteristic reads use a per-characteristic slot that takes precedence
//! over notification handlers.

pub use {bridge::Class, client::*, profile::*, subs::NotifyHandler};

pub(crate) use conn::Conn;

mod bridge;
mod cache;
mod client;
mod conn;
mod demux;
mod profile;
mod subs;
