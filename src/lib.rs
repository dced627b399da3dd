//! # Master Control Remote node core
//!
//! Firmware core for distributed home-automation remote control nodes:
//! microcontroller-class devices that enumerate attached sensors and
//! actuators (1-Wire Dallas devices, I2C devices, local PWM outputs),
//! execute switch commands dispatched from a central server, and report
//! telemetry as JSON over a queue transport.
//!
//! ## Features
//!
//! - **Canonical device addressing**: fixed-capacity binary addresses shared
//!   by all bus families, with deterministic identity derivation
//! - **Command processing**: JSON wire commands with masked-write semantics,
//!   refid-correlated acknowledgements, and timeout expiry
//! - **Reading serialization**: one JSON envelope across temperature,
//!   humidity, switch, PWM, RAM, and engine-timing readings
//! - **Bounded memory**: heapless queues and fixed report buffers sized for
//!   microcontroller targets
//!
//! ## Quick Start
//!
//! ```rust
//! use mcremote::command::Command;
//! use mcremote::device::DeviceRegistry;
//! use mcremote::dispatch::CommandDispatcher;
//!
//! let registry = DeviceRegistry::new();
//! let mut dispatcher = CommandDispatcher::new();
//! dispatcher.register_bus(mcremote::identity::BusFamily::Local).unwrap();
//!
//! let json = r#"{"cmd":"heartbeat","refid":"r-1","mtime":0}"#;
//! let mut command = Command::parse(json, 1_000).unwrap();
//! command.resolve(&registry).unwrap();
//! let report = dispatcher.dispatch(command, 1_000).unwrap();
//! assert!(report.is_some());
//! ```
//!
//! ## Architecture
//!
//! - [`address`] - fixed-capacity bus addresses
//! - [`identity`] - bus families and derived device identities
//! - [`device`] - per-family device payloads and the registry
//! - [`command`] - wire command parsing and lifecycle
//! - [`dispatch`] - per-bus fan-out queues and ack correlation
//! - [`reading`] - measurement variants and the JSON envelope
//! - [`engine`] - per-bus worker contract and cycle timing
//! - [`monitor`] - heap observability

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

pub mod address;
pub mod command;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod reading;

// Re-export main public types for convenience
pub use address::DeviceAddress;
pub use command::{Command, CommandKind};
pub use device::{Device, DeviceRegistry};
pub use dispatch::CommandDispatcher;
pub use identity::{BusFamily, DeviceIdentity};
pub use reading::Reading;
