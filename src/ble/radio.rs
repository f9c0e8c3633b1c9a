//! Seam between the BLE task and the vendor radio stack.
//!
//! The stack reports back asynchronously: management and GATT events and
//! advertising reports are delivered to [`BleShared`](super::shared::BleShared)
//! from the stack's own dispatcher context, never as return values here.

use crate::config::{StackConfig, BT_ADDR_LEN};
use core::fmt::Debug;

/// Stack lifecycle events delivered to
/// [`BleShared::on_management`](super::shared::BleShared::on_management).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManagementEvent {
    /// Stack enable finished; `Err` carries the vendor status code.
    Enabled(Result<(), u32>),
    Disabled,
    AdvertStateChanged,
    ConnectionParamUpdate,
    PhyUpdate { tx_phy: u8, rx_phy: u8 },
}

/// GATT link events. Only forwarded to the task after it has registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattEvent {
    Connected {
        conn_id: u16,
        peer: [u8; BT_ADDR_LEN],
    },
    Disconnected {
        conn_id: u16,
    },
}

/// Operations the BLE task performs on the radio. Implemented by the
/// SoftDevice adapter on target and by a scripted mock in tests.
pub trait RadioStack {
    type Error: Debug;

    /// Start bringing the stack up. Completion is reported through
    /// `ManagementEvent::Enabled`.
    fn init(&mut self, config: &StackConfig) -> Result<(), Self::Error>;

    /// Start (`enable = true`) or stop observation. A started scan ends with
    /// a call to `BleShared::on_scan_complete` after `duration_secs`.
    fn observe(&mut self, enable: bool, duration_secs: u8) -> Result<(), Self::Error>;

    /// Route GATT connection events to the hub from now on.
    fn register_gatt(&mut self) -> Result<(), Self::Error>;

    /// Local controller address.
    fn local_address(&mut self) -> [u8; BT_ADDR_LEN];

    fn chip_name(&self) -> &'static str;

    fn firmware_version(&self) -> &'static str;
}
