use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU128;
use std::str::FromStr;

const SHIFT: u32 = u128::BITS - u32::BITS;
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_16: u128 = !((u16::MAX as u128) << SHIFT);

/// 16-, 32-, or 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[repr(transparent)]
#[serde(into = "String", try_from = "String")]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// Creates a UUID from a `u128`.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Creates a UUID from an assigned 16-bit Bluetooth SIG UUID.
    ///
    /// # Panics
    ///
    /// Panics if `v` is zero.
    #[inline]
    #[must_use]
    pub const fn uuid16(v: u16) -> Self {
        assert!(v != 0, "zero 16-bit UUID");
        match NonZeroU128::new((v as u128) << SHIFT | BASE) {
            Some(nz) => Self(nz),
            None => unreachable!(),
        }
    }

    /// Converts an assigned 16-bit Bluetooth SIG UUID to `u16`.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        (self.0.get() & MASK_16 == BASE && v > 0).then_some(v)
    }
}

impl Debug for Uuid {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(v) = self.as_u16() {
            write!(f, "{v:#06X}")
        } else {
            let v = self.0.get();
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
}

impl Display for Uuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl FromStr for Uuid {
    type Err = String;

    /// Parses a 16-bit UUID (`180D` or `0x180D`) or a 128-bit UUID with
    /// optional dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let digits: String = hex.chars().filter(|&c| c != '-').collect();
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("invalid UUID: {s:?}"));
        }
        let v = match digits.len() {
            4 => u16::from_str_radix(&digits, 16).map(|v| (u128::from(v) << SHIFT) | BASE),
            32 => u128::from_str_radix(&digits, 16),
            _ => return Err(format!("invalid UUID: {s:?}")),
        };
        v.ok()
            .filter(|&v| v != BASE)
            .and_then(Self::new)
            .ok_or_else(|| format!("invalid UUID: {s:?}"))
    }
}

impl TryFrom<String> for Uuid {
    type Error = String;

    #[inline]
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Uuid> for String {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.to_string()
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}
