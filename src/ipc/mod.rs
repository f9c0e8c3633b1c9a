//! Inter-processor message channel.
//!
//! The transport itself (mailbox, UART, shared memory) is outside the
//! core; this module only fixes the frame layout and the command
//! vocabulary, and defines the [`IpcLink`] seam the BLE task and the log
//! pipeline send through.
//!
//! Frame layout (136 bytes):
//! ```text
//! Byte 0      : command code
//! Bytes 1..4  : reserved (zero)
//! Bytes 4..8  : numeric value (u32, little-endian)
//! Bytes 8..136: opaque payload
//! ```

pub mod inbound;

use crate::config::{IPC_DATA_MAX_LEN, IPC_SEND_MAX_RETRIES, IPC_SEND_RETRY_DELAY_MS};
use crate::error::LinkError;
use crate::logger::Level;
use embassy_time::{block_for, Duration};

/// Serialized frame size in bytes.
pub const IPC_FRAME_LEN: usize = 8 + IPC_DATA_MAX_LEN;

/// Command codes exchanged with the peer processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IpcCommand {
    // Logging (0x90-0x9F)
    Log = 0x90,
    LogLevel = 0x91,
    LogError = 0x92,
    LogWarn = 0x93,
    LogInfo = 0x94,
    LogDebug = 0x95,

    // Bluetooth (0xE0-0xEF)
    BtScanStart = 0xE0,
    BtScanResult = 0xE1,
    BtScanComplete = 0xE2,
    BtConnect = 0xE3,
    BtDisconnect = 0xE4,
    /// Request (peer → gateway) and response (gateway → peer) share this code.
    BtStatus = 0xE5,
    BtGetHardware = 0xE6,
    BtHardwareInfo = 0xE7,
    BtConnected = 0xE8,
    BtDisconnected = 0xE9,
    BtError = 0xEA,
}

impl IpcCommand {
    pub fn from_code(code: u8) -> Option<Self> {
        let cmd = match code {
            0x90 => IpcCommand::Log,
            0x91 => IpcCommand::LogLevel,
            0x92 => IpcCommand::LogError,
            0x93 => IpcCommand::LogWarn,
            0x94 => IpcCommand::LogInfo,
            0x95 => IpcCommand::LogDebug,
            0xE0 => IpcCommand::BtScanStart,
            0xE1 => IpcCommand::BtScanResult,
            0xE2 => IpcCommand::BtScanComplete,
            0xE3 => IpcCommand::BtConnect,
            0xE4 => IpcCommand::BtDisconnect,
            0xE5 => IpcCommand::BtStatus,
            0xE6 => IpcCommand::BtGetHardware,
            0xE7 => IpcCommand::BtHardwareInfo,
            0xE8 => IpcCommand::BtConnected,
            0xE9 => IpcCommand::BtDisconnected,
            0xEA => IpcCommand::BtError,
            _ => return None,
        };
        Some(cmd)
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Frame code used when forwarding a log entry of `level`.
    pub const fn for_log_level(level: Level) -> Self {
        match level {
            Level::Error => IpcCommand::LogError,
            Level::Warn => IpcCommand::LogWarn,
            Level::Info => IpcCommand::LogInfo,
            Level::Debug => IpcCommand::LogDebug,
            Level::None | Level::Verbose => IpcCommand::Log,
        }
    }

    /// Inverse of [`for_log_level`](Self::for_log_level) for frames coming
    /// from the peer. `LOG` and `LOG_LEVEL` carry no severity of their own.
    pub const fn log_level(self) -> Option<Level> {
        match self {
            IpcCommand::LogError => Some(Level::Error),
            IpcCommand::LogWarn => Some(Level::Warn),
            IpcCommand::LogInfo | IpcCommand::Log => Some(Level::Info),
            IpcCommand::LogDebug => Some(Level::Debug),
            _ => None,
        }
    }

    /// `true` for the codes the peer sends to the BLE task.
    pub const fn is_bt_request(self) -> bool {
        matches!(
            self,
            IpcCommand::BtScanStart
                | IpcCommand::BtConnect
                | IpcCommand::BtDisconnect
                | IpcCommand::BtStatus
                | IpcCommand::BtGetHardware
        )
    }
}

/// One tagged message exchanged over the inter-processor transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpcFrame {
    /// Raw command code; unknown codes survive decoding so the receiver can
    /// log them.
    pub cmd: u8,
    pub value: u32,
    pub data: [u8; IPC_DATA_MAX_LEN],
}

impl IpcFrame {
    pub const fn new(cmd: IpcCommand) -> Self {
        Self::with_value(cmd, 0)
    }

    pub const fn with_value(cmd: IpcCommand, value: u32) -> Self {
        Self {
            cmd: cmd as u8,
            value,
            data: [0; IPC_DATA_MAX_LEN],
        }
    }

    pub fn command(&self) -> Option<IpcCommand> {
        IpcCommand::from_code(self.cmd)
    }

    /// Copy `payload` into the data field, truncating to the field size.
    /// Returns the number of bytes copied.
    pub fn set_payload(&mut self, payload: &[u8]) -> usize {
        let n = payload.len().min(IPC_DATA_MAX_LEN);
        self.data[..n].copy_from_slice(&payload[..n]);
        self.data[n..].fill(0);
        n
    }

    /// Store `text` as a NUL-terminated string, truncating so the NUL fits.
    pub fn set_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let n = bytes.len().min(IPC_DATA_MAX_LEN - 1);
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.data[n..].fill(0);
    }

    /// Payload up to the first NUL, as UTF-8 (empty if not valid UTF-8).
    pub fn text(&self) -> &str {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(IPC_DATA_MAX_LEN);
        core::str::from_utf8(&self.data[..end]).unwrap_or("")
    }

    /// Serialise into a byte slice for the transport.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < IPC_FRAME_LEN {
            return 0;
        }
        buf[0] = self.cmd;
        buf[1..4].fill(0);
        buf[4..8].copy_from_slice(&self.value.to_le_bytes());
        buf[8..IPC_FRAME_LEN].copy_from_slice(&self.data);
        IPC_FRAME_LEN
    }

    /// Parse a frame received from the transport.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < IPC_FRAME_LEN {
            return None;
        }
        let mut data = [0u8; IPC_DATA_MAX_LEN];
        data.copy_from_slice(&buf[8..IPC_FRAME_LEN]);
        Some(Self {
            cmd: buf[0],
            value: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data,
        })
    }
}

/// Sending half of the inter-processor transport.
///
/// Implementations must be callable from several tasks; `&self` receivers
/// leave the locking to the transport.
pub trait IpcLink {
    /// Present one frame to the peer without waiting.
    fn try_send(&self, frame: &IpcFrame) -> Result<(), LinkError>;

    /// Send, retrying while the transport reports [`LinkError::Busy`].
    ///
    /// `max_attempts == 0` selects [`IPC_SEND_MAX_RETRIES`]. Between attempts
    /// the caller busy-waits [`IPC_SEND_RETRY_DELAY_MS`].
    fn send_retry(&self, frame: &IpcFrame, max_attempts: u32) -> Result<(), LinkError> {
        let limit = if max_attempts > 0 {
            max_attempts
        } else {
            IPC_SEND_MAX_RETRIES
        };

        for attempt in 1..=limit {
            match self.try_send(frame) {
                Err(LinkError::Busy) if attempt < limit => {
                    block_for(Duration::from_millis(IPC_SEND_RETRY_DELAY_MS));
                }
                result => return result,
            }
        }
        Err(LinkError::Busy)
    }

    /// Send a payload-less frame carrying `cmd` and `value`.
    fn send_cmd(&self, cmd: IpcCommand, value: u32) -> Result<(), LinkError> {
        self.send_retry(&IpcFrame::with_value(cmd, value), 0)
    }
}

impl<T: IpcLink + ?Sized> IpcLink for &T {
    fn try_send(&self, frame: &IpcFrame) -> Result<(), LinkError> {
        (**self).try_send(frame)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
