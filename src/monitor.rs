use crate::identity::IdentityBuffer;
use crate::reading::Reading;

/// Default spacing between heap samples.
pub const DEFAULT_SAMPLE_PERIOD_S: u64 = 60;

/// Low-priority heap/stack observability. Counters come in from the host
/// scheduler's watch task; one RAM reading and one log line go out per
/// sample period. Not part of core correctness.
#[derive(Debug)]
pub struct HeapMonitor {
    node: IdentityBuffer,
    sample_period_s: u64,
    last_sample_s: u64,
    low_water: u32,
}

impl HeapMonitor {
    pub fn new(node: IdentityBuffer, sample_period_s: u64) -> Self {
        Self {
            node,
            sample_period_s,
            last_sample_s: 0,
            low_water: u32::MAX,
        }
    }

    /// Least free heap seen since startup.
    pub fn low_water(&self) -> u32 {
        self.low_water
    }

    /// Feeds one counter pair in; emits a RAM reading when the sample
    /// period has elapsed.
    pub fn sample(&mut self, freeram: u32, maxram: u32, now_s: u64) -> Option<Reading> {
        if freeram < self.low_water {
            self.low_water = freeram;
        }

        if now_s < self.last_sample_s + self.sample_period_s {
            return None;
        }
        self.last_sample_s = now_s;

        tracing::info!(
            node = self.node.as_str(),
            freeram,
            maxram,
            low_water = self.low_water,
            "heap sample"
        );

        Some(Reading::ram(self.node.as_str(), now_s, freeram, maxram))
    }
}
