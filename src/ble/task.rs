//! The BLE task: sole owner of the radio stack.
//!
//! Startup brings the stack up and registers for GATT events; afterwards the
//! task consumes the command queue one frame at a time and answers the peer
//! over IPC. Link events from the GATT callback are handled between
//! commands.

use super::radio::{GattEvent, RadioStack};
use super::shared::BleShared;
use super::{AddrDisplay, BleState, BtErrorCode, HardwareRecord, StatusRecord};
use crate::config::{
    BT_ADDR_LEN, BT_CMD_POLL_MS, BT_DEVICE_NAME_MAX_LEN, BT_SCAN_DURATION_SEC,
    BT_SCAN_RESULT_PACING_MS, BT_SCAN_WATCHDOG_MARGIN_MS, BT_STACK_ENABLE_TIMEOUT_MS,
    STACK_CONFIG,
};
use crate::error::{BleError, Error};
use crate::ipc::{IpcCommand, IpcFrame, IpcLink};
use crate::{log_debug, log_error, log_info, log_warn};
use embassy_futures::select::{select3, Either3};
use embassy_time::{with_timeout, Duration, Instant, Timer};

/// Timing knobs of the BLE task. Defaults come from [`crate::config`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskTimings {
    /// Bound on the wait for `ENABLED` at startup.
    pub enable_timeout: Duration,
    /// Command dequeue timeout.
    pub command_poll: Duration,
    /// Observation window passed to the radio (seconds).
    pub scan_duration_secs: u8,
    /// Slack past the observation window before the radio is force-stopped.
    pub scan_watchdog_margin: Duration,
    /// Gap after each `SCAN_RESULT` frame.
    pub result_pacing: Duration,
}

impl Default for TaskTimings {
    fn default() -> Self {
        Self {
            enable_timeout: Duration::from_millis(BT_STACK_ENABLE_TIMEOUT_MS),
            command_poll: Duration::from_millis(BT_CMD_POLL_MS),
            scan_duration_secs: BT_SCAN_DURATION_SEC,
            scan_watchdog_margin: Duration::from_millis(BT_SCAN_WATCHDOG_MARGIN_MS),
            result_pacing: Duration::from_millis(BT_SCAN_RESULT_PACING_MS),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ActiveLink {
    conn_id: u16,
    peer: [u8; BT_ADDR_LEN],
}

pub struct BleTask<'d, R: RadioStack, L: IpcLink> {
    shared: &'d BleShared,
    radio: R,
    link: L,
    timings: TaskTimings,
    connection: Option<ActiveLink>,
}

impl<'d, R: RadioStack, L: IpcLink> BleTask<'d, R, L> {
    pub fn new(shared: &'d BleShared, radio: R, link: L) -> Self {
        Self::with_timings(shared, radio, link, TaskTimings::default())
    }

    pub fn with_timings(shared: &'d BleShared, radio: R, link: L, timings: TaskTimings) -> Self {
        Self {
            shared,
            radio,
            link,
            timings,
            connection: None,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Start the stack, then serve commands forever.
    ///
    /// Only returns if startup fails; the returned error is terminal.
    pub async fn run(mut self) -> Error {
        if let Err(e) = self.start().await {
            return e;
        }
        loop {
            self.step().await;
        }
    }

    /// Bring the stack up.
    ///
    /// Commands arriving before `ENABLED` are dispatched right away, so the
    /// peer gets `ERROR(NOT_READY)` instead of silence.
    pub async fn start(&mut self) -> Result<(), Error> {
        let shared = self.shared;

        shared.set_state(BleState::Initializing);
        shared.set_initialized(false);
        shared.enabled.reset();
        shared.open_queue();
        log_info!(tag: "BT", "BT task started, initializing stack");

        if let Err(e) = self.radio.init(&STACK_CONFIG) {
            log_error!(tag: "BT", "stack init failed: {:?}", e);
            return Err(self.fail_startup(BleError::StackInit));
        }

        let deadline = Instant::now() + self.timings.enable_timeout;
        loop {
            match select3(
                shared.enabled.wait(),
                shared.commands.receive(),
                Timer::at(deadline),
            )
            .await
            {
                Either3::First(Ok(())) => break,
                Either3::First(Err(status)) => {
                    log_error!(tag: "BT", "stack enable rejected: 0x{:X}", status);
                    return Err(self.fail_startup(BleError::EnableFailed));
                }
                Either3::Second(frame) => self.dispatch(&frame).await,
                Either3::Third(()) => {
                    log_error!(tag: "BT", "timeout waiting for BT stack enable");
                    return Err(self.fail_startup(BleError::EnableTimeout));
                }
            }
        }

        shared.set_initialized(true);
        shared.set_state(BleState::Ready);

        match self.radio.register_gatt() {
            Ok(()) => shared.set_gatt_registered(true),
            Err(e) => log_warn!(tag: "BT", "GATT registration failed: {:?}", e),
        }

        log_info!(tag: "BT", "BT stack ready, waiting for commands");
        Ok(())
    }

    /// Wait for one command or link event (bounded by the poll timeout) and
    /// handle it.
    pub async fn step(&mut self) {
        let shared = self.shared;
        match select3(
            shared.commands.receive(),
            shared.links.receive(),
            Timer::after(self.timings.command_poll),
        )
        .await
        {
            Either3::First(frame) => self.dispatch(&frame).await,
            Either3::Second(event) => self.handle_link_event(event),
            Either3::Third(()) => {}
        }
    }

    fn fail_startup(&mut self, err: BleError) -> Error {
        self.shared.set_state(BleState::Error);
        self.shared.close_queue();
        self.emit_error(BtErrorCode::StackInit);
        Error::Ble(err)
    }

    async fn dispatch(&mut self, frame: &IpcFrame) {
        log_debug!(tag: "BT", "processing command 0x{:02X}", frame.cmd);

        match frame.command() {
            Some(IpcCommand::BtScanStart) => self.handle_scan_start().await,
            Some(IpcCommand::BtStatus) => self.handle_status(),
            Some(IpcCommand::BtGetHardware) => self.handle_get_hardware(),
            Some(IpcCommand::BtConnect) | Some(IpcCommand::BtDisconnect) => {
                log_warn!(tag: "BT", "connect/disconnect not supported");
                self.emit_error(BtErrorCode::NotReady);
            }
            _ => log_warn!(tag: "BT", "unknown BT command: 0x{:02X}", frame.cmd),
        }
    }

    fn idle_state(&self) -> BleState {
        if self.connection.is_some() {
            BleState::Connected
        } else {
            BleState::Ready
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Command handlers
    // ═══════════════════════════════════════════════════════════════════════

    async fn handle_scan_start(&mut self) {
        let shared = self.shared;

        if !shared.is_initialized() {
            log_warn!(tag: "BT", "BT not ready, cannot scan");
            self.emit_error(BtErrorCode::NotReady);
            return;
        }

        if shared.take_scanning() {
            log_info!(tag: "BT", "stopping previous scan");
            if let Err(e) = self.radio.observe(false, 0) {
                log_warn!(tag: "BT", "stop of previous scan failed: {:?}", e);
            }
        }

        shared.clear_results();
        shared.scan_done.reset();
        shared.set_state(BleState::Scanning);
        shared.set_scanning(true);

        let secs = self.timings.scan_duration_secs;
        log_info!(tag: "BT", "starting BLE scan ({} s)", secs);

        if let Err(e) = self.radio.observe(true, secs) {
            log_error!(tag: "BT", "failed to start scan: {:?}", e);
            shared.set_scanning(false);
            shared.set_state(self.idle_state());
            self.emit_error(BtErrorCode::ScanFailed);
            return;
        }

        let watchdog = Duration::from_secs(u64::from(secs)) + self.timings.scan_watchdog_margin;
        if with_timeout(watchdog, shared.scan_done.wait()).await.is_err() {
            log_warn!(tag: "BT", "scan timeout, stopping radio");
            if let Err(e) = self.radio.observe(false, 0) {
                log_warn!(tag: "BT", "force-stop failed: {:?}", e);
            }
            shared.set_scanning(false);
        }
        shared.set_state(self.idle_state());

        let count = shared.with_results(|r| r.len());
        log_info!(tag: "BT", "scan complete, found {} devices", count);

        for idx in 0..count {
            let mut frame = IpcFrame::with_value(IpcCommand::BtScanResult, idx as u32);
            let written = shared.with_results(|r| {
                r.get(idx).map_or(0, |rec| rec.serialize(&mut frame.data))
            });
            if written == 0 {
                break;
            }
            self.emit(&frame);
            Timer::after(self.timings.result_pacing).await;
        }

        self.emit(&IpcFrame::with_value(
            IpcCommand::BtScanComplete,
            count as u32,
        ));
    }

    fn handle_status(&mut self) {
        let status = StatusRecord {
            state: self.shared.state(),
            num_connections: u8::from(self.connection.is_some()),
            is_scanning: self.shared.is_scanning(),
            is_advertising: false,
            connected_addr: self.connection.map_or([0; BT_ADDR_LEN], |c| c.peer),
            connected_rssi: 0,
            connected_name: [0; BT_DEVICE_NAME_MAX_LEN],
        };

        let mut frame = IpcFrame::new(IpcCommand::BtStatus);
        status.serialize(&mut frame.data);
        self.emit(&frame);
    }

    fn handle_get_hardware(&mut self) {
        if !self.shared.is_initialized() {
            log_warn!(tag: "BT", "BT not ready, no hardware info");
            self.emit_error(BtErrorCode::NotReady);
            return;
        }

        let hw = HardwareRecord::new(
            self.radio.local_address(),
            self.shared.state(),
            u8::from(self.connection.is_some()),
            self.radio.firmware_version(),
            self.radio.chip_name(),
        );
        log_info!(tag: "BT", "local address {}", AddrDisplay(&hw.address));

        let mut frame = IpcFrame::new(IpcCommand::BtHardwareInfo);
        hw.serialize(&mut frame.data);
        self.emit(&frame);
    }

    fn handle_link_event(&mut self, event: GattEvent) {
        match event {
            GattEvent::Connected { conn_id, peer } => {
                log_info!(tag: "BT", "GATT connected: {} (conn {})", AddrDisplay(&peer), conn_id);
                self.connection = Some(ActiveLink { conn_id, peer });
                self.shared.set_state(BleState::Connected);

                let mut frame = IpcFrame::new(IpcCommand::BtConnected);
                frame.set_payload(&peer);
                self.emit(&frame);
            }
            GattEvent::Disconnected { conn_id } => {
                log_info!(tag: "BT", "GATT disconnected (conn {})", conn_id);
                if self.connection.is_some_and(|c| c.conn_id == conn_id) {
                    self.connection = None;
                }
                self.shared.set_state(self.idle_state());
                self.emit(&IpcFrame::new(IpcCommand::BtDisconnected));
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // IPC output
    // ═══════════════════════════════════════════════════════════════════════

    fn emit(&self, frame: &IpcFrame) {
        if let Err(e) = self.link.send_retry(frame, 0) {
            log_warn!(tag: "BT", "IPC send of 0x{:02X} failed: {:?}", frame.cmd, e);
        }
    }

    fn emit_error(&self, code: BtErrorCode) {
        if let Err(e) = self.link.send_cmd(IpcCommand::BtError, code as u32) {
            log_warn!(tag: "BT", "IPC send of BT_ERROR({:?}) failed: {:?}", code, e);
        }
    }
}
