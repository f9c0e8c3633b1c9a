//! Bluetooth Low Energy subsystem.
//!
//! The gateway drives the radio in observer mode only:
//!
//! 1. **Callback hub** ([`shared::BleShared`]) - the radio adapter reports
//!    management, GATT and advertising events here from its own context.
//! 2. **Scan buffer** - de-duplicates advertisers seen during one scan.
//! 3. **BLE task** ([`task::BleTask`]) - owns the radio, consumes the command
//!    queue and answers the peer processor over IPC.
//!
//! The records in this module are the payloads of the Bluetooth IPC frames.

pub mod adv_parser;
pub mod radio;
pub mod scan_buffer;
pub mod shared;
pub mod task;

#[cfg(test)]
mod tests;

use crate::config::{BT_ADDR_LEN, BT_CHIP_NAME_LEN, BT_DEVICE_NAME_MAX_LEN, BT_FW_VERSION_LEN};
use core::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════════════════════

/// Radio subsystem state as reported to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BleState {
    Off = 0,
    Initializing = 1,
    /// Stack initialized, idle.
    Ready = 2,
    Scanning = 3,
    Connected = 5,
    /// Terminal; the stack failed to come up.
    Error = 7,
}

impl BleState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(BleState::Off),
            1 => Some(BleState::Initializing),
            2 => Some(BleState::Ready),
            3 => Some(BleState::Scanning),
            5 => Some(BleState::Connected),
            7 => Some(BleState::Error),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BleState::Off => "Off",
            BleState::Initializing => "Initializing...",
            BleState::Ready => "Ready",
            BleState::Scanning => "Scanning...",
            BleState::Connected => "Connected",
            BleState::Error => "Error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AddrKind {
    Public = 0,
    Random = 1,
    PublicId = 2,
    RandomId = 3,
}

impl AddrKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(AddrKind::Public),
            1 => Some(AddrKind::Random),
            2 => Some(AddrKind::PublicId),
            3 => Some(AddrKind::RandomId),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceKind {
    Unknown = 0,
    /// BLE only.
    Le = 1,
    Classic = 2,
    Dual = 3,
}

impl DeviceKind {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => DeviceKind::Le,
            2 => DeviceKind::Classic,
            3 => DeviceKind::Dual,
            _ => DeviceKind::Unknown,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DeviceKind::Le => "BLE",
            DeviceKind::Classic => "Classic",
            DeviceKind::Dual => "Dual",
            DeviceKind::Unknown => "Unknown",
        }
    }
}

/// Error codes carried in the value field of `BT_ERROR` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BtErrorCode {
    None = 0,
    Timeout = 1,
    AuthFailed = 2,
    DeviceNotFound = 3,
    ConnectionLost = 4,
    StackInit = 5,
    ScanFailed = 6,
    NotReady = 7,
    Unknown = 0xFF,
}

impl BtErrorCode {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => BtErrorCode::None,
            1 => BtErrorCode::Timeout,
            2 => BtErrorCode::AuthFailed,
            3 => BtErrorCode::DeviceNotFound,
            4 => BtErrorCode::ConnectionLost,
            5 => BtErrorCode::StackInit,
            6 => BtErrorCode::ScanFailed,
            7 => BtErrorCode::NotReady,
            _ => BtErrorCode::Unknown,
        }
    }
}

/// Advertising PDU type of a received report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvEventType {
    ConnectableUndirected,
    ConnectableDirected,
    ScannableUndirected,
    NonConnectableUndirected,
    ScanResponse,
}

impl AdvEventType {
    pub const fn is_connectable(self) -> bool {
        matches!(
            self,
            AdvEventType::ConnectableUndirected | AdvEventType::ConnectableDirected
        )
    }
}

/// One advertising report as delivered by the radio adapter.
#[derive(Clone, Copy, Debug)]
pub struct AdvReport<'a> {
    pub address: [u8; BT_ADDR_LEN],
    pub addr_kind: AddrKind,
    pub rssi: i8,
    pub event_type: AdvEventType,
    /// Raw AD structures.
    pub data: &'a [u8],
}

/// Convert RSSI to signal bars (0-4) for display.
pub const fn rssi_to_bars(rssi: i8) -> u8 {
    match rssi {
        -50..=i8::MAX => 4,
        -60..=-51 => 3,
        -70..=-61 => 2,
        -80..=-71 => 1,
        _ => 0,
    }
}

/// `AA:BB:CC:DD:EE:FF` rendering of a device address.
pub struct AddrDisplay<'a>(pub &'a [u8; BT_ADDR_LEN]);

impl fmt::Display for AddrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// Copy `src` into a NUL-padded field, keeping at least one trailing NUL.
fn copy_cstr(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len().saturating_sub(1));
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

/// The bytes of a NUL-padded field up to the first NUL, as UTF-8.
fn cstr(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("")
}

// ═══════════════════════════════════════════════════════════════════════════
// Scan Record
// ═══════════════════════════════════════════════════════════════════════════

/// Flag bit: the advertiser accepts connections.
pub const FLAG_CONNECTABLE: u8 = 0x01;
/// Flag bit: the device is bonded. Never set by the gateway.
pub const FLAG_PAIRED: u8 = 0x02;

/// One de-duplicated advertiser.
///
/// Wire layout (43 bytes):
/// ```text
/// Bytes 0..6  : address
/// Byte 6      : address kind
/// Byte 7      : RSSI (i8)
/// Byte 8      : device kind
/// Byte 9      : flags
/// Bytes 10..43: name, NUL-padded
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanRecord {
    pub address: [u8; BT_ADDR_LEN],
    pub addr_kind: AddrKind,
    pub rssi: i8,
    pub device_kind: DeviceKind,
    pub flags: u8,
    pub name: [u8; BT_DEVICE_NAME_MAX_LEN],
}

impl ScanRecord {
    pub const WIRE_LEN: usize = BT_ADDR_LEN + 4 + BT_DEVICE_NAME_MAX_LEN;

    /// Build a record from the first sighting of an advertiser.
    pub fn from_report(report: &AdvReport<'_>) -> Self {
        let mut name = [0u8; BT_DEVICE_NAME_MAX_LEN];
        if let Some(raw) = adv_parser::extract_device_name(report.data) {
            copy_cstr(&mut name, raw);
        }
        Self {
            address: report.address,
            addr_kind: report.addr_kind,
            rssi: report.rssi,
            device_kind: DeviceKind::Le,
            flags: if report.event_type.is_connectable() {
                FLAG_CONNECTABLE
            } else {
                0
            },
            name,
        }
    }

    pub fn name_str(&self) -> &str {
        cstr(&self.name)
    }

    pub fn is_connectable(&self) -> bool {
        self.flags & FLAG_CONNECTABLE != 0
    }

    pub fn is_paired(&self) -> bool {
        self.flags & FLAG_PAIRED != 0
    }

    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < Self::WIRE_LEN {
            return 0;
        }
        buf[0..6].copy_from_slice(&self.address);
        buf[6] = self.addr_kind as u8;
        buf[7] = self.rssi as u8;
        buf[8] = self.device_kind as u8;
        buf[9] = self.flags;
        buf[10..Self::WIRE_LEN].copy_from_slice(&self.name);
        Self::WIRE_LEN
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_LEN {
            return None;
        }
        let mut address = [0u8; BT_ADDR_LEN];
        address.copy_from_slice(&buf[0..6]);
        let mut name = [0u8; BT_DEVICE_NAME_MAX_LEN];
        name.copy_from_slice(&buf[10..Self::WIRE_LEN]);
        Some(Self {
            address,
            addr_kind: AddrKind::from_u8(buf[6])?,
            rssi: buf[7] as i8,
            device_kind: DeviceKind::from_u8(buf[8]),
            flags: buf[9],
            name,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Status Record
// ═══════════════════════════════════════════════════════════════════════════

/// Payload of a `BT_STATUS` response.
///
/// Wire layout (45 bytes):
/// ```text
/// Byte 0      : state
/// Byte 1      : active connections
/// Byte 2      : scanning flag
/// Byte 3      : advertising flag
/// Bytes 4..10 : connected peer address
/// Byte 10     : connected peer RSSI (i8)
/// Byte 11     : reserved
/// Bytes 12..45: connected peer name, NUL-padded
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusRecord {
    pub state: BleState,
    pub num_connections: u8,
    pub is_scanning: bool,
    pub is_advertising: bool,
    pub connected_addr: [u8; BT_ADDR_LEN],
    pub connected_rssi: i8,
    pub connected_name: [u8; BT_DEVICE_NAME_MAX_LEN],
}

impl StatusRecord {
    pub const WIRE_LEN: usize = 4 + BT_ADDR_LEN + 2 + BT_DEVICE_NAME_MAX_LEN;

    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < Self::WIRE_LEN {
            return 0;
        }
        buf[0] = self.state as u8;
        buf[1] = self.num_connections;
        buf[2] = self.is_scanning as u8;
        buf[3] = self.is_advertising as u8;
        buf[4..10].copy_from_slice(&self.connected_addr);
        buf[10] = self.connected_rssi as u8;
        buf[11] = 0;
        buf[12..Self::WIRE_LEN].copy_from_slice(&self.connected_name);
        Self::WIRE_LEN
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_LEN {
            return None;
        }
        let mut connected_addr = [0u8; BT_ADDR_LEN];
        connected_addr.copy_from_slice(&buf[4..10]);
        let mut connected_name = [0u8; BT_DEVICE_NAME_MAX_LEN];
        connected_name.copy_from_slice(&buf[12..Self::WIRE_LEN]);
        Some(Self {
            state: BleState::from_u8(buf[0])?,
            num_connections: buf[1],
            is_scanning: buf[2] != 0,
            is_advertising: buf[3] != 0,
            connected_addr,
            connected_rssi: buf[10] as i8,
            connected_name,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Hardware Record
// ═══════════════════════════════════════════════════════════════════════════

/// Payload of a `BT_HARDWARE_INFO` response.
///
/// Wire layout (40 bytes): `addr[6], state, num_connections,
/// fw_version[16], chip_name[16]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareRecord {
    pub address: [u8; BT_ADDR_LEN],
    pub state: BleState,
    pub num_connections: u8,
    pub fw_version: [u8; BT_FW_VERSION_LEN],
    pub chip_name: [u8; BT_CHIP_NAME_LEN],
}

impl HardwareRecord {
    pub const WIRE_LEN: usize = BT_ADDR_LEN + 2 + BT_FW_VERSION_LEN + BT_CHIP_NAME_LEN;

    pub fn new(
        address: [u8; BT_ADDR_LEN],
        state: BleState,
        num_connections: u8,
        fw_version: &str,
        chip_name: &str,
    ) -> Self {
        let mut rec = Self {
            address,
            state,
            num_connections,
            fw_version: [0; BT_FW_VERSION_LEN],
            chip_name: [0; BT_CHIP_NAME_LEN],
        };
        copy_cstr(&mut rec.fw_version, fw_version.as_bytes());
        copy_cstr(&mut rec.chip_name, chip_name.as_bytes());
        rec
    }

    pub fn chip_name_str(&self) -> &str {
        cstr(&self.chip_name)
    }

    pub fn fw_version_str(&self) -> &str {
        cstr(&self.fw_version)
    }

    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < Self::WIRE_LEN {
            return 0;
        }
        buf[0..6].copy_from_slice(&self.address);
        buf[6] = self.state as u8;
        buf[7] = self.num_connections;
        buf[8..24].copy_from_slice(&self.fw_version);
        buf[24..Self::WIRE_LEN].copy_from_slice(&self.chip_name);
        Self::WIRE_LEN
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_LEN {
            return None;
        }
        let mut address = [0u8; BT_ADDR_LEN];
        address.copy_from_slice(&buf[0..6]);
        let mut fw_version = [0u8; BT_FW_VERSION_LEN];
        fw_version.copy_from_slice(&buf[8..24]);
        let mut chip_name = [0u8; BT_CHIP_NAME_LEN];
        chip_name.copy_from_slice(&buf[24..Self::WIRE_LEN]);
        Some(Self {
            address,
            state: BleState::from_u8(buf[6])?,
            num_connections: buf[7],
            fw_version,
            chip_name,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
