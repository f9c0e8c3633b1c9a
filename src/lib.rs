//! Host-testable core of the bt2ipc gateway.
//!
//! Everything the embedded binary needs that does not touch the hardware
//! lives here: IPC framing, the BLE task and its callback hub, and the log
//! pipeline. The binary (`main.rs`, `embedded` feature) only adds the
//! SoftDevice adapter, the UART transport and the OLED widget.
//!
//! Usage: `cargo test --lib` runs the unit tests on the host.

#![cfg_attr(not(test), no_std)]

pub mod ble;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logger;

pub use ble::radio::{GattEvent, ManagementEvent, RadioStack};
pub use ble::shared::BleShared;
pub use ble::task::{BleTask, TaskTimings};
pub use error::{BleError, Error, LinkError};
pub use ipc::{IpcCommand, IpcFrame, IpcLink};
pub use logger::{Level, LogEntry, LogSink, LogTargets, Logger, LOGGER};
