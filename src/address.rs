use core::fmt::Write;

use arrayvec::ArrayString;

use crate::error::AddressError;

/// Widest address any bus family produces (1-Wire ROM code plus headroom).
pub const MAX_ADDRESS_LEN: usize = 10;

/// Canonical hex rendering: two lowercase chars per byte, no separators.
pub const ADDRESS_HEX_LEN: usize = 2 * MAX_ADDRESS_LEN;

pub type AddressHex = ArrayString<ADDRESS_HEX_LEN>;

/// Canonical binary address of one physical device on a shared bus.
///
/// Storage is a fixed array with a logical length; the unused tail is always
/// zero. Constructed once at bus discovery and immutable afterwards.
///
/// The first byte doubles as the emptiness sentinel: `0x00` means "unset".
/// Callers must never construct an address whose real first byte is zero;
/// that precondition is documented here rather than guarded internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    bytes: [u8; MAX_ADDRESS_LEN],
    len: u8,
}

impl DeviceAddress {
    /// Single-byte address (I2C bus address, PWM channel).
    pub fn from_byte(byte: u8) -> Self {
        let mut bytes = [0u8; MAX_ADDRESS_LEN];
        bytes[0] = byte;
        Self { bytes, len: 1 }
    }

    /// Builds an address from raw scan bytes. Slices longer than
    /// [`MAX_ADDRESS_LEN`] are rejected, never truncated.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, AddressError> {
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if raw.len() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong(raw.len()));
        }

        let mut bytes = [0u8; MAX_ADDRESS_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// False iff the first byte is the `0x00` sentinel. This is the only
    /// emptiness probe on an address.
    pub fn is_valid(&self) -> bool {
        self.bytes[0] != 0x00
    }

    /// Byte at `index`, bounds-checked against the logical length.
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        if index < self.len() {
            Some(self.bytes[index])
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Legacy window comparison used by registry and command matching:
    /// compares the first `self.len()` bytes of `self` against the same
    /// positions of `other`, regardless of `other`'s logical length.
    ///
    /// This is deliberately asymmetric: a 1-byte address `matches` any
    /// longer address sharing its first byte, but not the other way around
    /// (the longer window runs into the shorter address's zero padding).
    /// Full structural equality lives on `==`.
    pub fn matches(&self, other: &DeviceAddress) -> bool {
        let window = self.len();
        self.bytes[..window] == other.bytes[..window]
    }

    /// Canonical lowercase hex rendering for identity derivation and logs.
    pub fn hex(&self) -> AddressHex {
        let mut out = AddressHex::new();
        for byte in self.as_bytes() {
            // Capacity is exact for MAX_ADDRESS_LEN bytes, write cannot fail.
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_scan_buffers() {
        let raw = [0x28u8; MAX_ADDRESS_LEN + 1];
        assert_eq!(
            DeviceAddress::from_bytes(&raw),
            Err(AddressError::TooLong(MAX_ADDRESS_LEN + 1))
        );
        assert!(DeviceAddress::from_bytes(&raw[..MAX_ADDRESS_LEN]).is_ok());
    }

    #[test]
    fn byte_at_is_bounds_checked() {
        let addr = DeviceAddress::from_bytes(&[0x28, 0xff, 0x64]).unwrap();
        assert_eq!(addr.byte_at(0), Some(0x28));
        assert_eq!(addr.byte_at(2), Some(0x64));
        assert_eq!(addr.byte_at(3), None);
    }

    #[test]
    fn sentinel_governs_validity_for_any_length() {
        for len in 1..=MAX_ADDRESS_LEN {
            let mut raw = vec![0x28u8; len];
            assert!(DeviceAddress::from_bytes(&raw).unwrap().is_valid());
            raw[0] = 0x00;
            assert!(!DeviceAddress::from_bytes(&raw).unwrap().is_valid());
        }
    }
}
