//! LE-specific types.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Peer device address.
///
/// Host stacks that hide the 48-bit `BD_ADDR` from applications (CoreBluetooth
/// among them) identify peers with a stable 128-bit identifier instead. The
/// identifier is only meaningful to the host that assigned it.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Addr(u128);

impl Addr {
    /// Creates an address from a raw identifier.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Self {
        Self(v)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u128 {
        self.0
    }
}

impl FromStr for Addr {
    type Err = ();

    /// Parses 32 hex digits with or without the `8-4-4-4-12` dash separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const DASHES: [usize; 4] = [8, 13, 18, 23];
        let b = s.as_bytes();
        let ok = match b.len() {
            32 => b.iter().all(u8::is_ascii_hexdigit),
            36 => b.iter().enumerate().all(|(i, c)| {
                if DASHES.contains(&i) {
                    *c == b'-'
                } else {
                    c.is_ascii_hexdigit()
                }
            }),
            _ => false,
        };
        if !ok {
            return Err(());
        }
        let digits: String = s.chars().filter(|&c| c != '-').collect();
        u128::from_str_radix(&digits, 16).map(Self).map_err(|_| ())
    }
}

impl Debug for Addr {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            (v & ((1 << 48) - 1)) as u64
        )
    }
}

impl Display for Addr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
