//! Unified error type for bt2ipc.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The radio stack returned a BLE-level error.
    Ble(BleError),

    // IPC
    /// The inter-processor link refused or failed a send.
    Link(LinkError),

    /// The BLE command queue stayed full for the whole enqueue window.
    CommandQueueFull,

    /// The BLE task is not running, so its queue refuses new commands.
    NotAccepting,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Stack init call was rejected.
    StackInit,
    /// The stack reported `ENABLED` with a failure status.
    EnableFailed,
    /// No `ENABLED` event within the startup bound.
    EnableTimeout,
    /// Observation could not start.
    ScanFailed,
    /// The stack is not up yet.
    NotReady,
    /// Raw status code from the vendor stack.
    Raw(u32),
}

/// Send failures reported by an [`IpcLink`](crate::ipc::IpcLink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The transport slot is occupied; retrying may succeed.
    Busy,
    /// The transport rejected the frame.
    Fault,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Error::Link(e)
    }
}
