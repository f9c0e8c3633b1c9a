//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, queue depths, and wire-size limits live here so
//! they can be tuned in one place.

// BLE

/// Duration of a BLE observation window (seconds).
pub const BT_SCAN_DURATION_SEC: u8 = 10;

/// Extra time the BLE task waits past the scan window before force-stopping
/// the radio (ms).
pub const BT_SCAN_WATCHDOG_MARGIN_MS: u64 = 2_000;

/// Maximum number of distinct advertisers kept per scan.
pub const BT_SCAN_MAX_RESULTS: usize = 16;

/// Device-name field size in a scan record (32 chars + NUL).
pub const BT_DEVICE_NAME_MAX_LEN: usize = 33;

/// Bluetooth device address length.
pub const BT_ADDR_LEN: usize = 6;

/// Depth of the BLE command FIFO.
pub const BT_CMD_QUEUE_LENGTH: usize = 8;

/// Depth of the GATT link-event channel between callbacks and the BLE task.
pub const BT_LINK_EVENT_QUEUE_LENGTH: usize = 4;

/// How long the BLE task waits for the stack to report `ENABLED` (ms).
pub const BT_STACK_ENABLE_TIMEOUT_MS: u64 = 10_000;

/// Command dequeue timeout; a timeout is a no-op (ms).
pub const BT_CMD_POLL_MS: u64 = 1_000;

/// Bound on how long an inbound producer may wait for command-queue space (ms).
pub const BT_CMD_ENQUEUE_TIMEOUT_MS: u64 = 100;

/// Delay between consecutive `SCAN_RESULT` frames. The peer has a single
/// inbound slot and drops frames that arrive faster (ms).
pub const BT_SCAN_RESULT_PACING_MS: u64 = 20;

/// Chip identifier field size in the hardware record.
pub const BT_CHIP_NAME_LEN: usize = 16;

/// Firmware version field size in the hardware record.
pub const BT_FW_VERSION_LEN: usize = 16;

/// Radio stack configuration handed to the stack at init.
///
/// Scan-only profile: passive observation, a single link, no bonding
/// database. Advertising intervals are carried for completeness but the
/// gateway never advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackConfig {
    pub device_name: &'static str,
    pub passive_scan: bool,
    pub max_simultaneous_links: u8,
    pub max_rx_pdu_size: u16,
    pub addr_resolution_db_size: u8,
    pub bonding_db_size: u8,
    /// Advertising interval range (0.625 ms units). Unused in scan-only mode.
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,
}

pub const STACK_CONFIG: StackConfig = StackConfig {
    device_name: "bt2ipc gateway",
    passive_scan: true,
    max_simultaneous_links: 1,
    max_rx_pdu_size: 65,
    addr_resolution_db_size: 3,
    bonding_db_size: 0,
    adv_interval_min: 48,
    adv_interval_max: 96,
};

// IPC

/// Opaque payload size of an IPC frame.
pub const IPC_DATA_MAX_LEN: usize = 128;

/// Default number of send attempts when the caller passes 0.
pub const IPC_SEND_MAX_RETRIES: u32 = 10;

/// Busy-wait between send attempts (ms).
pub const IPC_SEND_RETRY_DELAY_MS: u64 = 1;

// Logging

/// Number of log entries the pipeline can hold before dropping.
pub const LOG_QUEUE_SIZE: usize = 16;

/// Log message buffer size including the terminating NUL.
pub const LOG_MSG_MAX_LEN: usize = 128;

/// Usable message bytes (one byte reserved for the NUL on the wire).
pub const LOG_MSG_CAPACITY: usize = LOG_MSG_MAX_LEN - 1;

/// Lines kept by the on-screen log widget (0 = unlimited).
/// Six lines of 6x10 text fill a 128x64 OLED.
pub const LOG_WIDGET_MAX_LINES: usize = 6;

/// Rolling text buffer size of the on-screen log widget.
pub const LOG_WIDGET_BUFFER_LEN: usize = LOG_MSG_MAX_LEN * 10;

/// Sleep after the queue drains in `flush` so the sinks can finish (ms).
pub const LOG_FLUSH_SETTLE_MS: u64 = 10;

// UART (embedded only)

/// Baud rate of the console UART.
pub const CONSOLE_BAUD: u32 = 115_200;

/// Baud rate of the IPC UART to the peer processor.
pub const IPC_UART_BAUD: u32 = 1_000_000;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` pins are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Console TX     → P0.06
//   Console RX     → P0.08
//   IPC TX         → P1.02
//   IPC RX         → P1.01
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27
