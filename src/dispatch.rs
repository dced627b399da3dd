use heapless::{Deque, Vec};
use serde::Serialize;
use serde_json::json;

use crate::command::{Command, CommandKind, CommandPhase, RefidBuffer};
use crate::error::{DispatchError, ReadingError};
use crate::identity::BusFamily;
use crate::reading::ReportBuffer;

pub const MAX_BUS_QUEUES: usize = 4;
pub const PER_BUS_QUEUE_DEPTH: usize = 16;
pub const MAX_TRACKED_COMMANDS: usize = 16;
/// A dispatched command unacknowledged past this deadline is reported as a
/// timeout rejection instead of leaking in the tracker forever.
pub const DEFAULT_COMMAND_EXPIRY_US: u64 = 5_000_000;

/// Upstream report correlated by refid: either an acknowledgement with the
/// measured latency, or a timeout rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReport {
    Ack {
        refid: RefidBuffer,
        latency_us: u64,
        mtime_s: u64,
    },
    Timeout {
        refid: RefidBuffer,
        mtime_s: u64,
    },
}

impl CommandReport {
    pub fn refid(&self) -> &str {
        match self {
            CommandReport::Ack { refid, .. } | CommandReport::Timeout { refid, .. } => refid,
        }
    }

    pub fn to_json(&self) -> Result<ReportBuffer, ReadingError> {
        let value = match self {
            CommandReport::Ack {
                refid,
                latency_us,
                mtime_s,
            } => json!({
                "refid": refid.as_str(),
                "ack": true,
                "latency_us": latency_us,
                "mtime": mtime_s,
            }),
            CommandReport::Timeout { refid, mtime_s } => json!({
                "refid": refid.as_str(),
                "ack": false,
                "reason": "timeout",
                "mtime": mtime_s,
            }),
        };

        let rendered = value.to_string();
        let mut buffer = ReportBuffer::new();
        buffer
            .try_push_str(&rendered)
            .map_err(|_| ReadingError::BufferOverflow)?;
        Ok(buffer)
    }
}

#[derive(Debug)]
struct BusQueue {
    family: BusFamily,
    queue: Deque<Command, PER_BUS_QUEUE_DEPTH>,
}

#[derive(Debug, Clone)]
struct TrackedCommand {
    refid: RefidBuffer,
    created_us: u64,
    deadline_us: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatchStats {
    pub dispatched: u32,
    pub acknowledged: u32,
    pub expired: u32,
    pub dropped: u32,
    pub queue_full: u32,
}

/// Fans resolved commands out to per-bus queues and correlates bus-side
/// acknowledgements back to refids. Queues are the only cross-task channel
/// for commands; the dispatcher itself must stay on a single owning task.
#[derive(Debug)]
pub struct CommandDispatcher {
    queues: Vec<BusQueue, MAX_BUS_QUEUES>,
    tracked: Vec<TrackedCommand, MAX_TRACKED_COMMANDS>,
    expiry_us: u64,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            queues: Vec::new(),
            tracked: Vec::new(),
            expiry_us: DEFAULT_COMMAND_EXPIRY_US,
            stats: DispatchStats::default(),
        }
    }

    pub fn set_expiry_us(&mut self, expiry_us: u64) {
        self.expiry_us = expiry_us;
    }

    pub fn register_bus(&mut self, family: BusFamily) -> Result<(), DispatchError> {
        if self.queues.iter().any(|bus| bus.family == family) {
            return Err(DispatchError::DuplicateBus(family));
        }
        self.queues
            .push(BusQueue {
                family,
                queue: Deque::new(),
            })
            .map_err(|_| DispatchError::BusTableFull)
    }

    /// Routes one resolved command.
    ///
    /// Device-targeted kinds are cloned onto every bus queue — buses don't
    /// know in advance which one owns the target, so breadth is cheap and
    /// each bus worker self-filters by its owned identities. Node-level
    /// kinds (heartbeat, time-sync) acknowledge immediately; unknown kinds
    /// are dropped with a log line.
    pub fn dispatch(
        &mut self,
        mut command: Command,
        now_us: u64,
    ) -> Result<Option<CommandReport>, DispatchError> {
        if command.phase() != CommandPhase::Resolved {
            return Err(DispatchError::NotDispatchable);
        }

        match command.kind {
            CommandKind::SetSwitch | CommandKind::SetName => {
                command.mark_dispatched();

                let mut first_failure = None;
                for bus in self.queues.iter_mut() {
                    if bus.queue.push_back(command.clone()).is_err() {
                        self.stats.queue_full += 1;
                        tracing::warn!(
                            bus = bus.family.prefix(),
                            refid = command.refid.as_str(),
                            "command queue full, send reported as failed"
                        );
                        if first_failure.is_none() {
                            first_failure = Some(DispatchError::QueueFull(bus.family));
                        }
                    }
                }

                if command.has_refid() {
                    self.track(&command, now_us);
                }
                self.stats.dispatched += 1;

                match first_failure {
                    Some(error) => Err(error),
                    None => Ok(None),
                }
            }
            CommandKind::TimeSync | CommandKind::Heartbeat => {
                command.mark_dispatched();
                self.stats.dispatched += 1;
                // Nothing travels to a bus; acknowledge in place.
                let latency_us = command.acknowledge(now_us)?;
                if command.has_refid() {
                    self.stats.acknowledged += 1;
                    Ok(Some(CommandReport::Ack {
                        refid: command.refid,
                        latency_us,
                        mtime_s: now_us / 1_000_000,
                    }))
                } else {
                    Ok(None)
                }
            }
            CommandKind::Unknown | CommandKind::None => {
                self.stats.dropped += 1;
                tracing::warn!(
                    kind = command.kind.as_wire(),
                    refid = command.refid.as_str(),
                    "dropping command of unknown kind"
                );
                Ok(None)
            }
        }
    }

    /// Bus-worker side: next command queued for `family`.
    pub fn pop_for(&mut self, family: BusFamily) -> Option<Command> {
        self.queues
            .iter_mut()
            .find(|bus| bus.family == family)?
            .queue
            .pop_front()
    }

    pub fn queued_for(&self, family: BusFamily) -> usize {
        self.queues
            .iter()
            .find(|bus| bus.family == family)
            .map_or(0, |bus| bus.queue.len())
    }

    /// Correlates a completed bus write back to its refid. Returns the ack
    /// report to push upstream, or `None` for unknown/already-settled
    /// refids (a late ack after expiry is a no-op).
    pub fn acknowledge(&mut self, refid: &str, now_us: u64) -> Option<CommandReport> {
        let index = self
            .tracked
            .iter()
            .position(|tracker| tracker.refid.as_str() == refid)?;
        let tracker = self.tracked.remove(index);
        self.stats.acknowledged += 1;

        Some(CommandReport::Ack {
            refid: tracker.refid,
            latency_us: now_us.saturating_sub(tracker.created_us),
            mtime_s: now_us / 1_000_000,
        })
    }

    /// Reports every tracked command past its deadline as a timeout
    /// rejection, exactly once each: settled trackers leave the table.
    pub fn expire_stale(&mut self, now_us: u64) -> Vec<CommandReport, MAX_TRACKED_COMMANDS> {
        let mut reports: Vec<CommandReport, MAX_TRACKED_COMMANDS> = Vec::new();

        let mut index = 0;
        while index < self.tracked.len() {
            if now_us > self.tracked[index].deadline_us {
                let tracker = self.tracked.remove(index);
                self.stats.expired += 1;
                tracing::warn!(refid = tracker.refid.as_str(), "command expired unacknowledged");
                let _ = reports.push(CommandReport::Timeout {
                    refid: tracker.refid,
                    mtime_s: now_us / 1_000_000,
                });
            } else {
                index += 1;
            }
        }

        reports
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn track(&mut self, command: &Command, now_us: u64) {
        let tracker = TrackedCommand {
            refid: command.refid,
            created_us: command.created_us,
            deadline_us: now_us + self.expiry_us,
        };

        if self.tracked.push(tracker.clone()).is_err() {
            // Evict the oldest tracker when the table is full.
            self.tracked.remove(0);
            let _ = self.tracked.push(tracker);
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::DeviceAddress;
    use crate::device::{DallasDevice, Device, DeviceKind, DeviceRegistry};

    fn registry_with_ds2408() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        let address = DeviceAddress::from_bytes(&[0x29, 0x11, 0x22, 0x33]).unwrap();
        let kind = DeviceKind::Dallas(DallasDevice::from_address(&address, false));
        registry.register(Device::new(address, kind)).unwrap();
        registry
    }

    fn resolved_switch_command(registry: &DeviceRegistry, refid: &str, now_us: u64) -> Command {
        let json = alloc::format!(
            r#"{{"device":"ow-29112233","cmd":"set_switch","mask":1,"state":1,"refid":"{}","mtime":0}}"#,
            refid
        );
        let mut command = Command::parse(&json, now_us).unwrap();
        command.resolve(registry).unwrap();
        command
    }

    #[test]
    fn fan_out_reaches_every_bus_queue() {
        let registry = registry_with_ds2408();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register_bus(BusFamily::OneWire).unwrap();
        dispatcher.register_bus(BusFamily::Local).unwrap();

        let command = resolved_switch_command(&registry, "ref-1", 1_000);
        dispatcher.dispatch(command, 1_000).unwrap();

        assert_eq!(dispatcher.queued_for(BusFamily::OneWire), 1);
        assert_eq!(dispatcher.queued_for(BusFamily::Local), 1);
        assert_eq!(dispatcher.tracked_count(), 1);
    }

    #[test]
    fn expiry_reports_exactly_once() {
        let registry = registry_with_ds2408();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register_bus(BusFamily::OneWire).unwrap();
        dispatcher.set_expiry_us(1_000);

        let command = resolved_switch_command(&registry, "ref-2", 1_000);
        dispatcher.dispatch(command, 1_000).unwrap();

        let first = dispatcher.expire_stale(10_000);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].refid(), "ref-2");

        let second = dispatcher.expire_stale(20_000);
        assert!(second.is_empty());

        // Late bus-side completion after expiry settles nothing.
        assert!(dispatcher.acknowledge("ref-2", 30_000).is_none());
    }

    #[test]
    fn acknowledge_measures_latency_from_parse() {
        let registry = registry_with_ds2408();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.register_bus(BusFamily::OneWire).unwrap();

        let command = resolved_switch_command(&registry, "ref-3", 5_000);
        dispatcher.dispatch(command, 5_000).unwrap();

        match dispatcher.acknowledge("ref-3", 9_500) {
            Some(CommandReport::Ack { latency_us, .. }) => assert_eq!(latency_us, 4_500),
            other => panic!("expected ack report, got {:?}", other),
        }
    }
}
