use arrayvec::ArrayString;
use serde_json::{json, Map, Value};
use static_assertions::const_assert;

use crate::error::ReadingError;
use crate::identity::IdentityBuffer;

/// Largest serialized report the node will emit. A switch reading carries
/// one array element per pin, which dominates the envelope size.
pub const MAX_REPORT_SIZE: usize = 512;
/// Widest supported switch bank.
pub const MAX_PIOS: u8 = 16;

// A full-width switch reading must fit the report buffer.
const_assert!(MAX_REPORT_SIZE >= 96 + 24 * MAX_PIOS as usize);

pub type ReportBuffer = ArrayString<MAX_REPORT_SIZE>;

/// Per-cycle engine phase timings, reported so the server can watch bus
/// health. All-zero cycles are suppressed by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineTiming {
    pub engine: &'static str,
    pub discover_us: u32,
    pub convert_us: u32,
    pub report_us: u32,
}

impl EngineTiming {
    pub fn has_nonzero_values(&self) -> bool {
        self.discover_us != 0 || self.convert_us != 0 || self.report_us != 0
    }
}

/// Family-specific measurement payload. The JSON type tag is fixed by the
/// variant at construction; serialization never rewrites it. Extension depth
/// is one level (humidity adds a single field to the temperature shape);
/// deeper hierarchies are unsupported.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingPayload {
    Celsius { tc: f32 },
    Humidity { tc: f32, rh: f32 },
    Switch { pio_count: u8, states: u16 },
    Pwm { duty: u16, duty_min: u16, duty_max: u16 },
    Ram { freeram: u32, maxram: u32 },
    Startup,
    EngineTiming(EngineTiming),
}

/// One measurement snapshot: created at read time, serialized immediately,
/// not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device: IdentityBuffer,
    pub mtime_s: u64,
    pub payload: ReadingPayload,
}

impl Reading {
    pub fn new(device: &str, mtime_s: u64, payload: ReadingPayload) -> Self {
        let mut id = IdentityBuffer::new();
        let _ = id.try_push_str(device);
        Self {
            device: id,
            mtime_s,
            payload,
        }
    }

    pub fn celsius(device: &str, mtime_s: u64, tc: f32) -> Self {
        Self::new(device, mtime_s, ReadingPayload::Celsius { tc })
    }

    pub fn humidity(device: &str, mtime_s: u64, tc: f32, rh: f32) -> Self {
        Self::new(device, mtime_s, ReadingPayload::Humidity { tc, rh })
    }

    /// Switch bank snapshot. Banks wider than [`MAX_PIOS`] fail construction
    /// instead of silently zeroing the reading.
    pub fn switch(
        device: &str,
        mtime_s: u64,
        pio_count: u8,
        states: u16,
    ) -> Result<Self, ReadingError> {
        if pio_count > MAX_PIOS {
            return Err(ReadingError::TooManyPios(pio_count));
        }
        Ok(Self::new(
            device,
            mtime_s,
            ReadingPayload::Switch { pio_count, states },
        ))
    }

    pub fn pwm(device: &str, mtime_s: u64, duty: u16, duty_min: u16, duty_max: u16) -> Self {
        Self::new(
            device,
            mtime_s,
            ReadingPayload::Pwm {
                duty,
                duty_min,
                duty_max,
            },
        )
    }

    pub fn ram(device: &str, mtime_s: u64, freeram: u32, maxram: u32) -> Self {
        Self::new(device, mtime_s, ReadingPayload::Ram { freeram, maxram })
    }

    pub fn startup(device: &str, mtime_s: u64) -> Self {
        Self::new(device, mtime_s, ReadingPayload::Startup)
    }

    pub fn engine_timing(device: &str, mtime_s: u64, timing: EngineTiming) -> Self {
        Self::new(device, mtime_s, ReadingPayload::EngineTiming(timing))
    }

    pub fn type_tag(&self) -> &'static str {
        match &self.payload {
            ReadingPayload::Celsius { .. } => "celsius",
            ReadingPayload::Humidity { .. } => "humidity",
            ReadingPayload::Switch { .. } => "switch",
            ReadingPayload::Pwm { .. } => "pwm",
            ReadingPayload::Ram { .. } => "ram",
            ReadingPayload::Startup => "startup",
            ReadingPayload::EngineTiming(_) => "engine",
        }
    }

    /// Canonical JSON envelope: common keys first (`device`, `mtime`,
    /// `type`), then the variant's fixed key set.
    fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("device".into(), Value::from(self.device.as_str()));
        root.insert("mtime".into(), Value::from(self.mtime_s));
        root.insert("type".into(), Value::from(self.type_tag()));

        match &self.payload {
            ReadingPayload::Celsius { tc } => {
                root.insert("tc".into(), Value::from(*tc));
                root.insert("tf".into(), Value::from(celsius_to_fahrenheit(*tc)));
            }
            ReadingPayload::Humidity { tc, rh } => {
                root.insert("tc".into(), Value::from(*tc));
                root.insert("tf".into(), Value::from(celsius_to_fahrenheit(*tc)));
                root.insert("rh".into(), Value::from(*rh));
            }
            ReadingPayload::Switch { pio_count, states } => {
                let mut pins = alloc::vec::Vec::with_capacity(*pio_count as usize);
                for pio in 0..*pio_count {
                    let state = (states >> pio) & 1 == 1;
                    pins.push(json!({ "pio": pio, "state": state }));
                }
                root.insert("pio_count".into(), Value::from(*pio_count));
                root.insert("states".into(), Value::Array(pins));
            }
            ReadingPayload::Pwm {
                duty,
                duty_min,
                duty_max,
            } => {
                root.insert("duty".into(), Value::from(*duty));
                root.insert("duty_max".into(), Value::from(*duty_max));
                root.insert("duty_min".into(), Value::from(*duty_min));
            }
            ReadingPayload::Ram { freeram, maxram } => {
                root.insert("freeram".into(), Value::from(*freeram));
                root.insert("maxram".into(), Value::from(*maxram));
            }
            ReadingPayload::Startup => {}
            ReadingPayload::EngineTiming(timing) => {
                root.insert("engine".into(), Value::from(timing.engine));
                root.insert("discover_us".into(), Value::from(timing.discover_us));
                root.insert("convert_us".into(), Value::from(timing.convert_us));
                root.insert("report_us".into(), Value::from(timing.report_us));
            }
        }

        Value::Object(root)
    }

    /// Serializes into the bounded report buffer. Overflow here is the
    /// fatal resource-exhaustion class: the caller must not continue as if
    /// the reading were reported.
    pub fn to_json(&self) -> Result<ReportBuffer, ReadingError> {
        let rendered = self.to_value().to_string();
        let mut buffer = ReportBuffer::new();
        buffer
            .try_push_str(&rendered)
            .map_err(|_| ReadingError::BufferOverflow)?;
        Ok(buffer)
    }
}

/// Exact conversion contract, computed in `f32`: `0.0 °C` is `32.0 °F` and
/// `100.0 °C` is `212.0 °F` with no rounding residue. The multiplier is a
/// literal, not a `9/5` quotient.
pub fn celsius_to_fahrenheit(tc: f32) -> f32 {
    tc * 1.8 + 32.0
}
