pub mod dallas;
pub mod i2c;
pub mod local;

pub use dallas::{DallasDevice, DallasModel};
pub use i2c::I2cDevice;
pub use local::LocalDevice;

use heapless::Vec;
use serde_json::json;

use crate::address::DeviceAddress;
use crate::command::apply_mask;
use crate::error::RegistryError;
use crate::identity::{BusFamily, DeviceIdentity};

pub const MAX_DEVICES: usize = 32;

/// Family-specific payload behind one addressable endpoint. Capability is a
/// closed set of probes on [`Device`], not open-ended type introspection.
#[derive(Debug, Clone, Copy)]
pub enum DeviceKind {
    Dallas(DallasDevice),
    I2c(I2cDevice),
    Local(LocalDevice),
}

impl DeviceKind {
    pub fn family(&self) -> BusFamily {
        match self {
            DeviceKind::Dallas(_) => BusFamily::OneWire,
            DeviceKind::I2c(_) => BusFamily::I2c,
            DeviceKind::Local(_) => BusFamily::Local,
        }
    }
}

/// One physical addressable endpoint: identity, canonical address, family
/// payload, and the output/timestamp metadata commands mutate.
#[derive(Debug, Clone)]
pub struct Device {
    identity: DeviceIdentity,
    address: DeviceAddress,
    kind: DeviceKind,
    output_state: u8,
    pub last_read_us: u64,
    pub last_write_us: u64,
}

impl Device {
    pub fn new(address: DeviceAddress, kind: DeviceKind) -> Self {
        let identity = DeviceIdentity::derive(kind.family(), &address);
        Self {
            identity,
            address,
            kind,
            output_state: 0,
            last_read_us: 0,
            last_write_us: 0,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn family(&self) -> BusFamily {
        self.kind.family()
    }

    pub fn has_temperature(&self) -> bool {
        match &self.kind {
            DeviceKind::Dallas(dallas) => dallas.has_temperature(),
            DeviceKind::I2c(_) => true,
            DeviceKind::Local(_) => false,
        }
    }

    /// True when the endpoint exposes writable switch bits.
    pub fn is_switch(&self) -> bool {
        match &self.kind {
            DeviceKind::Dallas(dallas) => dallas.pio_count() > 0,
            DeviceKind::I2c(_) => false,
            DeviceKind::Local(_) => true,
        }
    }

    pub fn output_state(&self) -> u8 {
        self.output_state
    }

    /// Applies a masked write to the output bits: only positions selected by
    /// `mask` change, everything else is preserved. Multiple independent
    /// switch channels share this register, so an unconditional overwrite is
    /// never correct here.
    pub fn apply_switch(&mut self, mask: u8, state: u8, now_us: u64) -> u8 {
        self.output_state = apply_mask(self.output_state, mask, state);
        self.last_write_us = now_us;

        let bits = self.output_state;
        if let DeviceKind::Local(local) = &mut self.kind {
            let channel_bit = 1u8 << (local.channel % 8);
            local.drive(bits & channel_bit != 0);
        }

        self.output_state
    }

    pub fn mark_read(&mut self, now_us: u64) {
        self.last_read_us = now_us;
    }
}

/// Registry of every enumerated device, keyed by identity string. The
/// registry exclusively owns its devices for the engine's process lifetime;
/// mutation must stay on the owning bus task.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Inserts or refreshes a device. Re-discovering an identity updates the
    /// family payload in place instead of duplicating the entry.
    pub fn register(&mut self, device: Device) -> Result<&Device, RegistryError> {
        if let Some(index) = self
            .devices
            .iter()
            .position(|known| known.identity() == device.identity())
        {
            let known = &mut self.devices[index];
            known.kind = device.kind;
            known.address = device.address;
            return Ok(&self.devices[index]);
        }

        self.devices.push(device).map_err(|_| RegistryError::Full)?;
        Ok(&self.devices[self.devices.len() - 1])
    }

    pub fn lookup(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.identity().as_str() == id)
    }

    pub fn lookup_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .find(|device| device.identity().as_str() == id)
    }

    /// Address-based lookup for pre-resolution command targets. Uses the
    /// legacy window comparison, so a short probe address can match a longer
    /// registered one (see [`DeviceAddress::matches`]).
    pub fn find_by_address(&self, family: BusFamily, address: &DeviceAddress) -> Option<&Device> {
        self.devices
            .iter()
            .find(|device| device.family() == family && address.matches(device.address()))
    }

    pub fn remove(&mut self, id: &str) -> Option<Device> {
        let index = self
            .devices
            .iter()
            .position(|device| device.identity().as_str() == id)?;
        Some(self.devices.remove(index))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    /// Device table snapshot for the node's status output.
    pub fn snapshot(&self) -> serde_json::Value {
        let entries: alloc::vec::Vec<serde_json::Value> = self
            .devices
            .iter()
            .map(|device| {
                json!({
                    "device": device.identity().as_str(),
                    "family": device.family().prefix(),
                    "switch": device.is_switch(),
                    "temperature": device.has_temperature(),
                    "state": device.output_state(),
                })
            })
            .collect();
        json!({ "devices": entries })
    }
}
