use thiserror::Error;

use crate::identity::BusFamily;

/// Address construction failures. Lengths out of bounds are rejected rather
/// than truncated: a truncated address would alias a different physical
/// device in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address length {0} exceeds maximum")]
    TooLong(usize),
}

/// Wire command parse/validation failures. A command that fails here is
/// terminal at `Rejected(ParseError)`: it is logged and dropped, never
/// retried locally (the server owns resends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command frame exceeds buffer size")]
    FrameTooLarge,
    #[error("invalid JSON frame")]
    InvalidJson,
    #[error("set_switch requires a target device or address")]
    MissingTarget,
    #[error("set_switch requires mask and state bits")]
    MissingBits,
    #[error("refid exceeds maximum length")]
    RefidTooLong,
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Dispatch-side failures. `QueueFull` is reported, never silently dropped;
/// the caller decides drop-or-retry per command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("target identity not found in registry")]
    UnresolvedTarget,
    #[error("command not in a dispatchable phase")]
    NotDispatchable,
    #[error("command queue full for bus {0:?}")]
    QueueFull(BusFamily),
    #[error("bus {0:?} already registered")]
    DuplicateBus(BusFamily),
    #[error("bus queue table full")]
    BusTableFull,
}

/// Reading construction/serialization failures. `BufferOverflow` during
/// serialization is the one fatal class on-target: it signals systemic
/// scarcity that continued operation cannot hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadingError {
    #[error("pio count {0} exceeds supported maximum")]
    TooManyPios(u8),
    #[error("serialized report exceeds buffer size")]
    BufferOverflow,
}

/// Device registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("device table full")]
    Full,
}
