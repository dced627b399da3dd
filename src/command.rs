use arrayvec::ArrayString;
use serde::Deserialize;

use crate::address::DeviceAddress;
use crate::device::DeviceRegistry;
use crate::error::{CommandError, DispatchError};
use crate::identity::{BusFamily, DeviceIdentity};

/// Largest inbound frame accepted off the command queue.
pub const MAX_COMMAND_SIZE: usize = 512;
/// Refids are UUID-shaped by convention but treated as opaque tokens.
pub const MAX_REFID_LEN: usize = 40;
/// Drift beyond this flags the node clock for resynchronization.
pub const MAX_CLOCK_SKEW_S: u64 = 30;

/// Longest device display name a set-name command may carry.
pub const MAX_NAME_LEN: usize = 32;

pub type RefidBuffer = ArrayString<MAX_REFID_LEN>;
pub type NameBuffer = ArrayString<MAX_NAME_LEN>;

/// Raw wire frame: every field optional so a malformed message degrades into
/// validation errors instead of a serde failure. Keys per the server
/// contract: `device`/`addr`, `cmd`, `mask`, `state`, `refid`, `mtime`.
#[derive(Debug, Deserialize)]
struct CommandFrame {
    device: Option<alloc::string::String>,
    addr: Option<alloc::vec::Vec<u8>>,
    family: Option<alloc::string::String>,
    cmd: Option<alloc::string::String>,
    mask: Option<u8>,
    state: Option<u8>,
    name: Option<alloc::string::String>,
    refid: Option<alloc::string::String>,
    mtime: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Unknown,
    None,
    TimeSync,
    SetSwitch,
    Heartbeat,
    SetName,
}

impl CommandKind {
    /// Absent or unrecognized discriminators map to `Unknown`, never an
    /// error: the command still flows through the machine and is dropped at
    /// dispatch with its refid intact for upstream reporting.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "time_sync" => CommandKind::TimeSync,
            "set_switch" => CommandKind::SetSwitch,
            "heartbeat" => CommandKind::Heartbeat,
            "set_name" => CommandKind::SetName,
            _ => CommandKind::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            CommandKind::Unknown => "unknown",
            CommandKind::None => "none",
            CommandKind::TimeSync => "time_sync",
            CommandKind::SetSwitch => "set_switch",
            CommandKind::Heartbeat => "heartbeat",
            CommandKind::SetName => "set_name",
        }
    }

    /// Kinds that address one physical device and must resolve before
    /// dispatch.
    pub fn targets_device(&self) -> bool {
        matches!(self, CommandKind::SetSwitch | CommandKind::SetName)
    }
}

/// Target as parsed off the wire; raw addresses are rewritten to identities
/// during resolution.
#[derive(Debug, Clone, Copy)]
pub enum CommandTarget {
    Identity(DeviceIdentity),
    RawAddress {
        family: BusFamily,
        address: DeviceAddress,
    },
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ParseError,
    UnresolvedTarget,
    Timeout,
}

/// Lifecycle: `Parsed → Resolved → Dispatched → Acknowledged`, with
/// `Rejected` terminal from any pre-ack phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Parsed,
    Resolved,
    Dispatched,
    Acknowledged,
    Rejected(RejectReason),
}

/// One inbound directive, from JSON parse to bus-side acknowledgement.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub target: CommandTarget,
    /// Output bits selected for change; same width as `state`.
    pub mask: u8,
    /// Target values for the selected bits.
    pub state: u8,
    /// Display name carried by set-name commands, empty otherwise.
    pub name: NameBuffer,
    pub refid: RefidBuffer,
    /// Server-side message timestamp, epoch seconds.
    pub mtime_s: u64,
    /// Local parse timestamp, microseconds.
    pub created_us: u64,
    /// Set when the embedded timestamp drifts past [`MAX_CLOCK_SKEW_S`];
    /// signals the clock subsystem, never rejects the command.
    pub needs_time_sync: bool,
    phase: CommandPhase,
    pub ack: bool,
    pub latency_us: u64,
}

impl Command {
    /// Blank placeholder command, used for queue slot initialization.
    pub fn blank() -> Self {
        Self {
            kind: CommandKind::None,
            target: CommandTarget::Unspecified,
            mask: 0,
            state: 0,
            name: NameBuffer::new(),
            refid: RefidBuffer::new(),
            mtime_s: 0,
            created_us: 0,
            needs_time_sync: false,
            phase: CommandPhase::Parsed,
            ack: false,
            latency_us: 0,
        }
    }

    /// Decodes one JSON frame into a `Parsed` command.
    ///
    /// Required-field failures reject here; a caller that still has the
    /// frame's refid should surface the rejection upstream before dropping.
    pub fn parse(json: &str, now_us: u64) -> Result<Self, CommandError> {
        if json.len() > MAX_COMMAND_SIZE {
            return Err(CommandError::FrameTooLarge);
        }

        let frame: CommandFrame =
            serde_json::from_str(json).map_err(|_| CommandError::InvalidJson)?;

        let kind = frame
            .cmd
            .as_deref()
            .map_or(CommandKind::Unknown, CommandKind::from_wire);

        let target = if let Some(id) = frame.device.as_deref() {
            CommandTarget::Identity(DeviceIdentity::from_wire(id)?)
        } else if let Some(raw) = frame.addr.as_deref() {
            // Raw scan addresses without a family tag come from the 1-Wire
            // engine, the only bus that reports bare ROM codes.
            let family = frame
                .family
                .as_deref()
                .and_then(BusFamily::from_wire)
                .unwrap_or(BusFamily::OneWire);
            CommandTarget::RawAddress {
                family,
                address: DeviceAddress::from_bytes(raw)?,
            }
        } else {
            CommandTarget::Unspecified
        };

        if kind == CommandKind::SetSwitch {
            if matches!(target, CommandTarget::Unspecified) {
                return Err(CommandError::MissingTarget);
            }
            if frame.mask.is_none() || frame.state.is_none() {
                return Err(CommandError::MissingBits);
            }
        }

        let refid = match frame.refid.as_deref() {
            Some(raw) => RefidBuffer::from(raw).map_err(|_| CommandError::RefidTooLong)?,
            None => RefidBuffer::new(),
        };

        // Overlong names truncate at the buffer; they are cosmetic, unlike
        // refids which must round-trip intact.
        let mut name = NameBuffer::new();
        if let Some(raw) = frame.name.as_deref() {
            for ch in raw.chars() {
                if name.try_push(ch).is_err() {
                    break;
                }
            }
        }

        let mtime_s = frame.mtime.unwrap_or(0);
        let needs_time_sync = mtime_s != 0 && mtime_s.abs_diff(now_us / 1_000_000) > MAX_CLOCK_SKEW_S;

        Ok(Self {
            kind,
            target,
            mask: frame.mask.unwrap_or(0),
            state: frame.state.unwrap_or(0),
            name,
            refid,
            mtime_s,
            created_us: now_us,
            needs_time_sync,
            phase: CommandPhase::Parsed,
            ack: false,
            latency_us: 0,
        })
    }

    pub fn phase(&self) -> CommandPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            CommandPhase::Acknowledged | CommandPhase::Rejected(_)
        )
    }

    pub fn has_refid(&self) -> bool {
        !self.refid.is_empty()
    }

    /// Binds the target to a registered identity. Raw addresses are matched
    /// through the registry's window comparison and rewritten to the
    /// registered identity; kinds without a device target resolve trivially.
    pub fn resolve(&mut self, registry: &DeviceRegistry) -> Result<(), DispatchError> {
        debug_assert_eq!(self.phase, CommandPhase::Parsed, "resolve out of phase");

        let resolved = match self.target {
            CommandTarget::Identity(identity) => registry.lookup(identity.as_str()).is_some(),
            CommandTarget::RawAddress { family, address } => {
                match registry.find_by_address(family, &address) {
                    Some(device) => {
                        self.target = CommandTarget::Identity(*device.identity());
                        true
                    }
                    None => false,
                }
            }
            CommandTarget::Unspecified => !self.kind.targets_device(),
        };

        if resolved {
            self.phase = CommandPhase::Resolved;
            Ok(())
        } else {
            self.phase = CommandPhase::Rejected(RejectReason::UnresolvedTarget);
            Err(DispatchError::UnresolvedTarget)
        }
    }

    /// Identity this command is bound to, once resolved.
    pub fn target_id(&self) -> Option<&str> {
        match &self.target {
            CommandTarget::Identity(identity) => Some(identity.as_str()),
            _ => None,
        }
    }

    pub fn mark_dispatched(&mut self) {
        debug_assert_eq!(self.phase, CommandPhase::Resolved, "dispatch out of phase");
        self.phase = CommandPhase::Dispatched;
    }

    /// Terminal acknowledgement. Only a dispatched command with a resolved
    /// target can be acknowledged; latency is measured from parse time.
    pub fn acknowledge(&mut self, now_us: u64) -> Result<u64, DispatchError> {
        if self.phase != CommandPhase::Dispatched {
            return Err(DispatchError::NotDispatchable);
        }
        self.ack = true;
        self.latency_us = now_us.saturating_sub(self.created_us);
        self.phase = CommandPhase::Acknowledged;
        Ok(self.latency_us)
    }

    /// Terminal rejection; no-op once a terminal phase is reached.
    pub fn reject(&mut self, reason: RejectReason) {
        if !self.is_terminal() {
            self.phase = CommandPhase::Rejected(reason);
        }
    }

    /// New output bits this command produces from `old`.
    pub fn apply_to(&self, old: u8) -> u8 {
        apply_mask(old, self.mask, self.state)
    }
}

/// The masked-write: bits selected by `mask` take their value from `state`,
/// all other bits are preserved.
pub fn apply_mask(old: u8, mask: u8, state: u8) -> u8 {
    (old & !mask) | (state & mask)
}
