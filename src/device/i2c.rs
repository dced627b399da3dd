use crate::address::DeviceAddress;

/// I2C device payload. The canonical address encoding is byte 0 = 7-bit bus
/// address, optional byte 1 = multiplexer channel; a device reached directly
/// has a 1-byte address.
#[derive(Debug, Clone, Copy)]
pub struct I2cDevice {
    pub bus_address: u8,
    pub mux_channel: Option<u8>,
}

impl I2cDevice {
    pub fn from_address(address: &DeviceAddress) -> Self {
        Self {
            bus_address: address.byte_at(0).unwrap_or(0x00),
            mux_channel: address.byte_at(1),
        }
    }

    /// Canonical address bytes for a direct or multiplexed device.
    pub fn encode_address(bus_address: u8, mux_channel: Option<u8>) -> DeviceAddress {
        match mux_channel {
            // Two-byte form cannot exceed the address capacity.
            Some(channel) => DeviceAddress::from_bytes(&[bus_address, channel])
                .unwrap_or_else(|_| DeviceAddress::from_byte(bus_address)),
            None => DeviceAddress::from_byte(bus_address),
        }
    }

    pub fn uses_multiplexer(&self) -> bool {
        self.mux_channel.is_some()
    }

    /// Multiplexer channel index, 0 for directly-attached devices.
    pub fn bus_index(&self) -> u8 {
        self.mux_channel.unwrap_or(0)
    }
}
