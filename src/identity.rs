use core::fmt;
use core::fmt::Write;

use arrayvec::ArrayString;

use crate::address::{DeviceAddress, MAX_ADDRESS_LEN};
use crate::error::CommandError;

/// Longest identity: 3-char family prefix, separator, full hex rendering.
pub const MAX_IDENTITY_LEN: usize = 4 + 2 * MAX_ADDRESS_LEN;

pub type IdentityBuffer = ArrayString<MAX_IDENTITY_LEN>;

/// Bus families a node can enumerate. The prefix is a stable wire literal;
/// nothing parses it back out of an identity string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFamily {
    OneWire,
    I2c,
    Local,
}

pub const BUS_FAMILIES: [BusFamily; 3] = [BusFamily::OneWire, BusFamily::I2c, BusFamily::Local];

impl BusFamily {
    pub fn prefix(&self) -> &'static str {
        match self {
            BusFamily::OneWire => "ow",
            BusFamily::I2c => "i2c",
            BusFamily::Local => "pwm",
        }
    }

    /// Wire tag used by raw-address command frames.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "ow" => Some(BusFamily::OneWire),
            "i2c" => Some(BusFamily::I2c),
            "pwm" => Some(BusFamily::Local),
            _ => None,
        }
    }
}

/// Externally-visible device id: family prefix plus canonical address hex.
///
/// Derivation is pure: identical family and address always yield the same
/// string. This is the sole lookup key for registries and command matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: IdentityBuffer,
}

impl DeviceIdentity {
    pub fn derive(family: BusFamily, address: &DeviceAddress) -> Self {
        let mut id = IdentityBuffer::new();
        // Prefix + separator + hex always fit MAX_IDENTITY_LEN.
        let _ = write!(id, "{}-{}", family.prefix(), address.hex());
        Self { id }
    }

    /// Wraps an identity string received on the wire.
    pub fn from_wire(raw: &str) -> Result<Self, CommandError> {
        let id = IdentityBuffer::from(raw).map_err(|_| CommandError::InvalidJson)?;
        Ok(Self { id })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Node-level host id, derived once at startup from the adapter MAC and
/// passed by reference into components that report node-scoped readings.
/// Replaces the legacy memoized-static lookup.
pub fn node_id_from_mac(mac: &[u8; 6]) -> IdentityBuffer {
    let mut id = IdentityBuffer::new();
    let _ = write!(id, "node-");
    for byte in mac {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic() {
        let addr = DeviceAddress::from_bytes(&[0x28, 0xff, 0x64, 0x0e]).unwrap();
        let a = DeviceIdentity::derive(BusFamily::OneWire, &addr);
        let b = DeviceIdentity::derive(BusFamily::OneWire, &addr);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ow-28ff640e");
    }

    #[test]
    fn node_id_renders_mac_lowercase() {
        let id = node_id_from_mac(&[0xaa, 0xbb, 0xcc, 0x00, 0x11, 0xff]);
        assert_eq!(id.as_str(), "node-aabbcc0011ff");
    }
}
