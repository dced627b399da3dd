use heapless::Vec;
use serde::Serialize;

use crate::command::Command;
use crate::device::{Device, DeviceKind, DeviceRegistry, LocalDevice};
use crate::identity::BusFamily;
use crate::reading::{EngineTiming, Reading};

/// Upper bound on readings one engine cycle can emit: one per device plus
/// the cycle's own timing reading.
pub const MAX_CYCLE_READINGS: usize = crate::device::MAX_DEVICES + 1;

pub type CycleReadings = Vec<Reading, MAX_CYCLE_READINGS>;

/// Per-bus worker contract: enumerate devices into the registry, produce
/// readings, execute switch commands against owned devices. A bus fault in
/// any step surfaces as "no reading" / "not acknowledged", never a crash.
pub trait BusEngine {
    fn family(&self) -> BusFamily;

    /// Stable engine tag used in timing reports.
    fn engine_id(&self) -> &'static str;

    /// Scans the bus and registers discovered devices. Returns the number
    /// of devices seen this scan.
    fn discover(&mut self, registry: &mut DeviceRegistry, now_us: u64)
        -> Result<usize, &'static str>;

    /// Reads every owned device, appending to `readings`.
    fn read_all(
        &mut self,
        registry: &mut DeviceRegistry,
        now_us: u64,
        readings: &mut CycleReadings,
    ) -> Result<(), &'static str>;

    /// Executes a dispatched command if this engine owns its target.
    /// Returns true when the command was applied here; false lets the
    /// fan-out copy on another bus handle it.
    fn execute(
        &mut self,
        registry: &mut DeviceRegistry,
        command: &Command,
        now_us: u64,
    ) -> Result<bool, &'static str>;
}

/// Phase marks for one engine cycle; yields the timing reading the
/// reporting collaborator may suppress when all-zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleTimer {
    started_us: u64,
    discover_us: u32,
    convert_us: u32,
    report_us: u32,
}

impl CycleTimer {
    pub fn start(now_us: u64) -> Self {
        Self {
            started_us: now_us,
            ..Self::default()
        }
    }

    pub fn mark_discover(&mut self, now_us: u64) {
        self.discover_us = now_us.saturating_sub(self.started_us) as u32;
        self.started_us = now_us;
    }

    pub fn mark_convert(&mut self, now_us: u64) {
        self.convert_us = now_us.saturating_sub(self.started_us) as u32;
        self.started_us = now_us;
    }

    pub fn mark_report(&mut self, now_us: u64) {
        self.report_us = now_us.saturating_sub(self.started_us) as u32;
        self.started_us = now_us;
    }

    pub fn timing(&self, engine: &'static str) -> EngineTiming {
        EngineTiming {
            engine,
            discover_us: self.discover_us,
            convert_us: self.convert_us,
            report_us: self.report_us,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub cycles: u32,
    pub readings_reported: u32,
    pub commands_executed: u32,
    pub discover_errors: u32,
}

/// Engine for locally-attached PWM output channels. No bus scan latency and
/// no external driver: discovery registers the configured channels once,
/// execution drives duty cycles through the masked write.
#[derive(Debug)]
pub struct LocalPwmEngine {
    channels: Vec<u8, 8>,
    stats: EngineStats,
}

impl LocalPwmEngine {
    pub fn new(channels: &[u8]) -> Self {
        let mut owned = Vec::new();
        for &channel in channels.iter().take(owned.capacity()) {
            let _ = owned.push(channel);
        }
        Self {
            channels: owned,
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

impl BusEngine for LocalPwmEngine {
    fn family(&self) -> BusFamily {
        BusFamily::Local
    }

    fn engine_id(&self) -> &'static str {
        "pwm"
    }

    fn discover(
        &mut self,
        registry: &mut DeviceRegistry,
        _now_us: u64,
    ) -> Result<usize, &'static str> {
        for &channel in &self.channels {
            // Channel numbering is 1-based on the wire so that channel 0
            // never collides with the unset-address sentinel.
            let address = crate::address::DeviceAddress::from_byte(channel + 1);
            let device = Device::new(address, DeviceKind::Local(LocalDevice::new(channel)));
            registry
                .register(device)
                .map_err(|_| "device table full")?;
        }
        Ok(self.channels.len())
    }

    fn read_all(
        &mut self,
        registry: &mut DeviceRegistry,
        now_us: u64,
        readings: &mut CycleReadings,
    ) -> Result<(), &'static str> {
        for device in registry.iter_mut() {
            let DeviceKind::Local(local) = *device.kind() else {
                continue;
            };
            device.mark_read(now_us);
            let reading = Reading::pwm(
                device.identity().as_str(),
                now_us / 1_000_000,
                local.duty,
                local.duty_min,
                local.duty_max,
            );
            readings.push(reading).map_err(|_| "reading buffer full")?;
            self.stats.readings_reported += 1;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        registry: &mut DeviceRegistry,
        command: &Command,
        now_us: u64,
    ) -> Result<bool, &'static str> {
        let Some(target) = command.target_id() else {
            return Ok(false);
        };
        let Some(device) = registry.lookup_mut(target) else {
            return Ok(false);
        };
        if device.family() != BusFamily::Local {
            return Ok(false);
        }

        match command.kind {
            crate::command::CommandKind::SetSwitch => {
                device.apply_switch(command.mask, command.state, now_us);
            }
            crate::command::CommandKind::SetName => {
                // Names live server-side; the write timestamp is the only
                // local effect.
                device.last_write_us = now_us;
            }
            _ => return Ok(false),
        }
        self.stats.commands_executed += 1;
        Ok(true)
    }
}
