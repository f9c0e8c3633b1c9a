//! State shared between the radio stack's callbacks, IPC producers and the
//! BLE task.
//!
//! Callbacks only write flags and the scan buffer, then wake the task
//! through a [`Signal`]. While a scan runs the task is parked on
//! `scan_done`, so the report callback is the only writer of the buffer.

use super::radio::{GattEvent, ManagementEvent};
use super::scan_buffer::{RecordOutcome, ScanBuffer};
use super::{AddrDisplay, AdvReport, BleState};
use crate::config::{BT_CMD_ENQUEUE_TIMEOUT_MS, BT_CMD_QUEUE_LENGTH, BT_LINK_EVENT_QUEUE_LENGTH};
use crate::error::Error;
use crate::ipc::IpcFrame;
use crate::{log_debug, log_error, log_info, log_warn};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

/// Callback hub and command queue of the BLE subsystem.
///
/// One static instance lives for the whole program; the radio adapter and
/// the IPC receiver hold `&'static` references to it.
pub struct BleShared {
    state: AtomicU8,
    initialized: AtomicBool,
    scanning: AtomicBool,
    gatt_registered: AtomicBool,
    accepting: AtomicBool,

    pub(crate) enabled: Signal<CriticalSectionRawMutex, Result<(), u32>>,
    pub(crate) scan_done: Signal<CriticalSectionRawMutex, ()>,
    results: Mutex<CriticalSectionRawMutex, RefCell<ScanBuffer>>,

    pub(crate) commands: Channel<CriticalSectionRawMutex, IpcFrame, BT_CMD_QUEUE_LENGTH>,
    pub(crate) links: Channel<CriticalSectionRawMutex, GattEvent, BT_LINK_EVENT_QUEUE_LENGTH>,
}

impl Default for BleShared {
    fn default() -> Self {
        Self::new()
    }
}

impl BleShared {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(BleState::Off as u8),
            initialized: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
            gatt_registered: AtomicBool::new(false),
            accepting: AtomicBool::new(false),
            enabled: Signal::new(),
            scan_done: Signal::new(),
            results: Mutex::new(RefCell::new(ScanBuffer::new())),
            commands: Channel::new(),
            links: Channel::new(),
        }
    }

    // ── Observers ────────────────────────────────────────────────────────

    pub fn state(&self) -> BleState {
        BleState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(BleState::Off)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Number of commands waiting for the BLE task.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Run `f` against the current scan buffer.
    pub fn with_results<R>(&self, f: impl FnOnce(&ScanBuffer) -> R) -> R {
        self.results.lock(|cell| f(&cell.borrow()))
    }

    // ── Task-side mutators ───────────────────────────────────────────────

    pub(crate) fn set_state(&self, state: BleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::Release);
    }

    pub(crate) fn set_scanning(&self, value: bool) {
        self.scanning.store(value, Ordering::Release);
    }

    /// Clear the scanning flag, returning whether it was set.
    pub(crate) fn take_scanning(&self) -> bool {
        self.scanning.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_gatt_registered(&self, value: bool) {
        self.gatt_registered.store(value, Ordering::Release);
    }

    pub(crate) fn clear_results(&self) {
        self.results.lock(|cell| cell.borrow_mut().clear());
    }

    /// Empty the command queue and start accepting producers.
    pub(crate) fn open_queue(&self) {
        self.commands.clear();
        self.accepting.store(true, Ordering::Release);
    }

    /// Refuse further producers and drop whatever is queued.
    pub(crate) fn close_queue(&self) {
        self.accepting.store(false, Ordering::Release);
        self.commands.clear();
    }

    // ── Producers ────────────────────────────────────────────────────────

    /// Queue a command for the BLE task, waiting at most
    /// [`BT_CMD_ENQUEUE_TIMEOUT_MS`] for space.
    pub async fn queue_command(&self, frame: IpcFrame) -> Result<(), Error> {
        if !self.accepting.load(Ordering::Acquire) {
            log_warn!(tag: "BT", "BT task not running, dropping cmd 0x{:02X}", frame.cmd);
            return Err(Error::NotAccepting);
        }

        let timeout = Duration::from_millis(BT_CMD_ENQUEUE_TIMEOUT_MS);
        with_timeout(timeout, self.commands.send(frame))
            .await
            .map_err(|_| {
                log_warn!(tag: "BT", "BT command queue full, dropping cmd 0x{:02X}", frame.cmd);
                Error::CommandQueueFull
            })
    }

    /// Non-blocking variant of [`queue_command`](Self::queue_command), safe
    /// to call from interrupt context.
    pub fn try_queue_command(&self, frame: IpcFrame) -> Result<(), Error> {
        if !self.accepting.load(Ordering::Acquire) {
            log_warn!(tag: "BT", "BT task not running, dropping cmd 0x{:02X}", frame.cmd);
            return Err(Error::NotAccepting);
        }
        self.commands.try_send(frame).map_err(|_| {
            log_warn!(tag: "BT", "BT command queue full, dropping cmd 0x{:02X}", frame.cmd);
            Error::CommandQueueFull
        })
    }

    // ── Radio callbacks ──────────────────────────────────────────────────

    /// Stack management callback.
    pub fn on_management(&self, event: ManagementEvent) {
        match event {
            ManagementEvent::Enabled(Ok(())) => {
                log_info!(tag: "BT", "Bluetooth stack enabled");
                self.enabled.signal(Ok(()));
            }
            ManagementEvent::Enabled(Err(status)) => {
                log_error!(tag: "BT", "Bluetooth stack enable failed: 0x{:X}", status);
                self.enabled.signal(Err(status));
            }
            ManagementEvent::Disabled => {
                log_warn!(tag: "BT", "Bluetooth stack disabled");
                self.set_initialized(false);
                self.set_state(BleState::Off);
            }
            ManagementEvent::AdvertStateChanged => {
                log_debug!(tag: "BT", "advertising state changed");
            }
            ManagementEvent::ConnectionParamUpdate => {
                log_debug!(tag: "BT", "connection parameters updated");
            }
            ManagementEvent::PhyUpdate { tx_phy, rx_phy } => {
                log_debug!(tag: "BT", "PHY update: tx={} rx={}", tx_phy, rx_phy);
            }
        }
    }

    /// GATT connection callback. Dropped until the task has registered.
    pub fn on_gatt(&self, event: GattEvent) {
        if !self.gatt_registered.load(Ordering::Acquire) {
            return;
        }
        if self.links.try_send(event).is_err() {
            log_warn!(tag: "BT", "link event queue full, dropping {:?}", event);
        }
    }

    /// Per-report observation callback. Reports outside a scan are ignored.
    pub fn on_scan_report(&self, report: &AdvReport<'_>) {
        if !self.is_scanning() {
            return;
        }
        let outcome = self.results.lock(|cell| cell.borrow_mut().record(report));
        if let RecordOutcome::Added(idx) = outcome {
            log_debug!(
                tag: "BT",
                "found #{} {} rssi={}",
                idx,
                AddrDisplay(&report.address),
                report.rssi
            );
        }
    }

    /// Terminal marker of an observation.
    pub fn on_scan_complete(&self) {
        if !self.take_scanning() {
            return;
        }
        self.set_state(BleState::Ready);
        self.scan_done.signal(());
    }
}
