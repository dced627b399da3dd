use crate::address::DeviceAddress;

/// 1-Wire ROM family codes this node understands. The code is byte 0 of the
/// ROM address, which is also why the `0x00` address sentinel can never
/// collide with a real device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DallasModel {
    Ds18s20,
    Ds1822,
    Ds18b20,
    Ds2408,
    Ds2413,
    Ds2438,
    Unknown,
}

impl DallasModel {
    pub fn from_family_code(code: u8) -> Self {
        match code {
            0x10 => DallasModel::Ds18s20,
            0x22 => DallasModel::Ds1822,
            0x28 => DallasModel::Ds18b20,
            0x29 => DallasModel::Ds2408,
            0x3a => DallasModel::Ds2413,
            0x26 => DallasModel::Ds2438,
            _ => DallasModel::Unknown,
        }
    }
}

/// 1-Wire device payload: model decoded from the ROM family code plus the
/// parasite-power probe result from discovery.
#[derive(Debug, Clone, Copy)]
pub struct DallasDevice {
    pub model: DallasModel,
    pub parasite_powered: bool,
}

impl DallasDevice {
    pub fn from_address(address: &DeviceAddress, parasite_powered: bool) -> Self {
        let code = address.byte_at(0).unwrap_or(0x00);
        Self {
            model: DallasModel::from_family_code(code),
            parasite_powered,
        }
    }

    pub fn has_temperature(&self) -> bool {
        matches!(
            self.model,
            DallasModel::Ds18s20 | DallasModel::Ds1822 | DallasModel::Ds18b20 | DallasModel::Ds2438
        )
    }

    pub fn is_ds2408(&self) -> bool {
        self.model == DallasModel::Ds2408
    }

    /// Switch channels exposed by this model, zero for pure sensors.
    pub fn pio_count(&self) -> u8 {
        match self.model {
            DallasModel::Ds2408 => 8,
            DallasModel::Ds2413 => 2,
            _ => 0,
        }
    }
}
