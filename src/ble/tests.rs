//! Scenario tests for the BLE task.
//!
//! These tests run on the host with a scripted radio and an in-memory IPC
//! link. The radio delivers its scan reports synchronously from `observe`,
//! the same way the stack's dispatcher does while the task is parked.

use super::radio::{GattEvent, ManagementEvent, RadioStack};
use super::shared::BleShared;
use super::task::{BleTask, TaskTimings};
use super::{AddrKind, AdvEventType, AdvReport, BleState, BtErrorCode, HardwareRecord};
use super::{ScanRecord, StatusRecord};
use crate::config::{StackConfig, BT_ADDR_LEN, BT_SCAN_MAX_RESULTS};
use crate::error::{BleError, Error, LinkError};
use crate::ipc::{IpcCommand, IpcFrame, IpcLink};
use core::cell::RefCell;
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_time::{with_timeout, Duration};
use std::vec::Vec;

// ═══════════════════════════════════════════════════════════════════════════
// Test doubles
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Scripted {
    address: [u8; BT_ADDR_LEN],
    rssi: i8,
    event_type: AdvEventType,
    data: Vec<u8>,
}

fn adv(last: u8, rssi: i8, name: &str) -> Scripted {
    let mut data = vec![name.len() as u8 + 1, 0x09];
    data.extend_from_slice(name.as_bytes());
    Scripted {
        address: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last],
        rssi,
        event_type: AdvEventType::ConnectableUndirected,
        data,
    }
}

struct MockRadio<'a> {
    shared: &'a BleShared,
    /// Event delivered from `init`; `None` means the stack never answers.
    enable_event: Option<ManagementEvent>,
    init_fails: bool,
    observe_fails: bool,
    /// Deliver the terminal marker at the end of each scan.
    completes: bool,
    scans: Vec<Vec<Scripted>>,
    scans_started: usize,
    stops: usize,
}

impl<'a> MockRadio<'a> {
    fn new(shared: &'a BleShared) -> Self {
        Self {
            shared,
            enable_event: Some(ManagementEvent::Enabled(Ok(()))),
            init_fails: false,
            observe_fails: false,
            completes: true,
            scans: Vec::new(),
            scans_started: 0,
            stops: 0,
        }
    }

    fn with_scan(mut self, reports: Vec<Scripted>) -> Self {
        self.scans.push(reports);
        self
    }
}

impl RadioStack for MockRadio<'_> {
    type Error = BleError;

    fn init(&mut self, _config: &StackConfig) -> Result<(), BleError> {
        if self.init_fails {
            return Err(BleError::Raw(0x08));
        }
        if let Some(event) = self.enable_event {
            self.shared.on_management(event);
        }
        Ok(())
    }

    fn observe(&mut self, enable: bool, _duration_secs: u8) -> Result<(), BleError> {
        if !enable {
            self.stops += 1;
            return Ok(());
        }
        if self.observe_fails {
            return Err(BleError::ScanFailed);
        }

        let reports = self.scans.get(self.scans_started).cloned().unwrap_or_default();
        self.scans_started += 1;
        for r in &reports {
            self.shared.on_scan_report(&AdvReport {
                address: r.address,
                addr_kind: AddrKind::Random,
                rssi: r.rssi,
                event_type: r.event_type,
                data: &r.data,
            });
        }
        if self.completes {
            self.shared.on_scan_complete();
        }
        Ok(())
    }

    fn register_gatt(&mut self) -> Result<(), BleError> {
        Ok(())
    }

    fn local_address(&mut self) -> [u8; BT_ADDR_LEN] {
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]
    }

    fn chip_name(&self) -> &'static str {
        "nRF52840"
    }

    fn firmware_version(&self) -> &'static str {
        "S140 7.3.0"
    }
}

#[derive(Default)]
struct MockLink {
    sent: RefCell<Vec<IpcFrame>>,
}

impl MockLink {
    fn frames(&self) -> Vec<IpcFrame> {
        self.sent.borrow().clone()
    }

    fn codes(&self) -> Vec<IpcCommand> {
        self.sent.borrow().iter().filter_map(|f| f.command()).collect()
    }

    fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl IpcLink for MockLink {
    fn try_send(&self, frame: &IpcFrame) -> Result<(), LinkError> {
        self.sent.borrow_mut().push(*frame);
        Ok(())
    }
}

fn fast() -> TaskTimings {
    TaskTimings {
        enable_timeout: Duration::from_millis(200),
        command_poll: Duration::from_millis(20),
        scan_duration_secs: 0,
        scan_watchdog_margin: Duration::from_millis(50),
        result_pacing: Duration::from_millis(0),
    }
}

fn error_frame(code: BtErrorCode) -> (Option<IpcCommand>, u32) {
    (Some(IpcCommand::BtError), code as u32)
}

fn summary(frames: &[IpcFrame]) -> Vec<(Option<IpcCommand>, u32)> {
    frames.iter().map(|f| (f.command(), f.value)).collect()
}

/// Queue `cmd` and let the task handle it.
fn send<R: RadioStack, L: IpcLink>(task: &mut BleTask<'_, R, L>, shared: &BleShared, cmd: IpcCommand) {
    shared.try_queue_command(IpcFrame::new(cmd)).unwrap();
    block_on(task.step());
}

// ═══════════════════════════════════════════════════════════════════════════
// Startup
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn startup_reaches_ready() {
    let shared = BleShared::new();
    let link = MockLink::default();
    assert_eq!(shared.state(), BleState::Off);

    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    assert_eq!(block_on(task.start()), Ok(()));
    assert_eq!(shared.state(), BleState::Ready);
    assert!(shared.is_initialized());
    assert!(link.frames().is_empty());
}

#[test]
fn stack_init_failure_is_terminal() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.init_fails = true;

    let task = BleTask::with_timings(&shared, radio, &link, fast());
    assert_eq!(block_on(task.run()), Error::Ble(BleError::StackInit));
    assert_eq!(shared.state(), BleState::Error);
    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::StackInit)]);

    // The queue refuses producers once the task is gone.
    assert_eq!(
        shared.try_queue_command(IpcFrame::new(IpcCommand::BtStatus)),
        Err(Error::NotAccepting)
    );
}

#[test]
fn enable_failure_is_terminal() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.enable_event = Some(ManagementEvent::Enabled(Err(0x0D)));

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    assert_eq!(block_on(task.start()), Err(Error::Ble(BleError::EnableFailed)));
    assert_eq!(shared.state(), BleState::Error);
    assert!(!shared.is_initialized());
    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::StackInit)]);
}

#[test]
fn enable_timeout_answers_pending_scan_with_not_ready() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.enable_event = None;

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    let (started, queued) = block_on(join(
        task.start(),
        shared.queue_command(IpcFrame::new(IpcCommand::BtScanStart)),
    ));

    assert_eq!(queued, Ok(()));
    assert_eq!(started, Err(Error::Ble(BleError::EnableTimeout)));
    assert_eq!(
        summary(&link.frames()),
        [
            error_frame(BtErrorCode::NotReady),
            error_frame(BtErrorCode::StackInit)
        ]
    );
    assert_eq!(shared.state(), BleState::Error);
}

#[test]
fn scan_before_enable_leaves_state_initializing() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.enable_event = None;

    // Default timings: the stack gets the full 10 s, we only watch the first
    // 100 ms of it.
    let mut task = BleTask::new(&shared, radio, &link);
    let _ = block_on(join(
        with_timeout(Duration::from_millis(100), task.start()),
        shared.queue_command(IpcFrame::new(IpcCommand::BtScanStart)),
    ));

    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::NotReady)]);
    assert_eq!(shared.state(), BleState::Initializing);
    assert!(!shared.is_scanning());
}

// ═══════════════════════════════════════════════════════════════════════════
// Scanning
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn cold_scan_reports_unique_devices() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let radio = MockRadio::new(&shared).with_scan(vec![
        adv(1, -70, "Thermo"),
        adv(2, -55, "Lamp"),
        adv(3, -80, "Tag"),
        adv(1, -41, "Thermo"),
    ]);

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtScanStart);

    let frames = link.frames();
    assert_eq!(
        summary(&frames),
        [
            (Some(IpcCommand::BtScanResult), 0),
            (Some(IpcCommand::BtScanResult), 1),
            (Some(IpcCommand::BtScanResult), 2),
            (Some(IpcCommand::BtScanComplete), 3),
        ]
    );

    let first = ScanRecord::from_bytes(&frames[0].data).unwrap();
    assert_eq!(first.address[5], 1);
    assert_eq!(first.rssi, -41);
    assert_eq!(first.name_str(), "Thermo");
    assert!(first.is_connectable());

    let third = ScanRecord::from_bytes(&frames[2].data).unwrap();
    assert_eq!(third.name_str(), "Tag");

    assert_eq!(shared.state(), BleState::Ready);
    assert!(!shared.is_scanning());
}

#[test]
fn overflow_scan_caps_results() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let reports = (0..BT_SCAN_MAX_RESULTS as u8 + 5)
        .map(|i| adv(i, -60, "dev"))
        .collect();
    let radio = MockRadio::new(&shared).with_scan(reports);

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtScanStart);

    let frames = link.frames();
    let results: Vec<_> = frames
        .iter()
        .filter(|f| f.command() == Some(IpcCommand::BtScanResult))
        .collect();
    assert_eq!(results.len(), BT_SCAN_MAX_RESULTS);

    // Earlier records are untouched by the overflow.
    for (i, frame) in results.iter().enumerate() {
        let rec = ScanRecord::from_bytes(&frame.data).unwrap();
        assert_eq!(rec.address[5] as usize, i);
    }

    let last = frames.last().unwrap();
    assert_eq!(last.command(), Some(IpcCommand::BtScanComplete));
    assert_eq!(last.value as usize, BT_SCAN_MAX_RESULTS);
}

#[test]
fn consecutive_scans_start_empty() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let radio = MockRadio::new(&shared)
        .with_scan(vec![adv(1, -50, "a"), adv(2, -50, "b")])
        .with_scan(vec![adv(9, -50, "z")]);

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();

    send(&mut task, &shared, IpcCommand::BtScanStart);
    assert_eq!(link.frames().last().map(|f| f.value), Some(2));
    link.clear();

    send(&mut task, &shared, IpcCommand::BtScanStart);
    let frames = link.frames();
    assert_eq!(frames.len(), 2);
    let only = ScanRecord::from_bytes(&frames[0].data).unwrap();
    assert_eq!(only.address[5], 9);
    assert_eq!(frames[1].value, 1);
    assert_eq!(shared.with_results(|r| r.len()), 1);
}

#[test]
fn result_count_matches_complete_value() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let radio = MockRadio::new(&shared).with_scan(vec![
        adv(4, -50, "x"),
        adv(4, -52, "x"),
        adv(5, -50, "y"),
    ]);

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtScanStart);

    let frames = link.frames();
    let results = frames
        .iter()
        .filter(|f| f.command() == Some(IpcCommand::BtScanResult))
        .count();
    assert_eq!(results as u32, frames.last().unwrap().value);
    assert!(shared.with_results(|r| {
        r.iter()
            .enumerate()
            .all(|(i, a)| r.iter().skip(i + 1).all(|b| b.address != a.address))
    }));
}

#[test]
fn scan_watchdog_force_stops_radio() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared).with_scan(vec![adv(7, -66, "slow")]);
    radio.completes = false;

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtScanStart);

    assert_eq!(task.radio().stops, 1);
    assert!(!shared.is_scanning());
    assert_eq!(shared.state(), BleState::Ready);
    assert_eq!(
        summary(&link.frames()),
        [
            (Some(IpcCommand::BtScanResult), 0),
            (Some(IpcCommand::BtScanComplete), 1)
        ]
    );
}

#[test]
fn scan_start_failure_is_transient() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.observe_fails = true;

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtScanStart);

    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::ScanFailed)]);
    assert_eq!(shared.state(), BleState::Ready);
    assert!(!shared.is_scanning());

    // The next scan goes through once the radio recovers.
    link.clear();
    task.radio_mut().observe_fails = false;
    send(&mut task, &shared, IpcCommand::BtScanStart);
    assert_eq!(link.codes(), [IpcCommand::BtScanComplete]);
}

#[test]
fn reports_outside_a_scan_are_ignored() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    let stray = adv(3, -30, "stray");
    shared.on_scan_report(&AdvReport {
        address: stray.address,
        addr_kind: AddrKind::Public,
        rssi: stray.rssi,
        event_type: stray.event_type,
        data: &stray.data,
    });
    assert_eq!(shared.with_results(|r| r.len()), 0);
}

#[test]
fn scan_rejected_after_stack_disabled() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    shared.on_management(ManagementEvent::Disabled);
    assert_eq!(shared.state(), BleState::Off);

    send(&mut task, &shared, IpcCommand::BtScanStart);
    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::NotReady)]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Status, hardware and unsupported commands
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn status_query_when_ready() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtStatus);

    let frames = link.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Some(IpcCommand::BtStatus));
    let status = StatusRecord::from_bytes(&frames[0].data).unwrap();
    assert_eq!(status.state, BleState::Ready);
    assert_eq!(status.num_connections, 0);
    assert!(!status.is_scanning);
    assert!(!status.is_advertising);
}

#[test]
fn hardware_info_reports_local_address_and_chip() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();
    send(&mut task, &shared, IpcCommand::BtGetHardware);

    let frames = link.frames();
    assert_eq!(frames[0].command(), Some(IpcCommand::BtHardwareInfo));
    let hw = HardwareRecord::from_bytes(&frames[0].data).unwrap();
    assert_eq!(hw.address, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    assert_eq!(hw.state, BleState::Ready);
    assert_eq!(hw.chip_name_str(), "nRF52840");
    assert_eq!(hw.fw_version_str(), "S140 7.3.0");
}

#[test]
fn connect_and_disconnect_are_rejected() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    send(&mut task, &shared, IpcCommand::BtConnect);
    send(&mut task, &shared, IpcCommand::BtDisconnect);
    assert_eq!(
        summary(&link.frames()),
        [
            error_frame(BtErrorCode::NotReady),
            error_frame(BtErrorCode::NotReady)
        ]
    );
    assert_eq!(shared.state(), BleState::Ready);
}

#[test]
fn unknown_command_is_ignored() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    let mut frame = IpcFrame::new(IpcCommand::BtStatus);
    frame.cmd = 0x42;
    shared.try_queue_command(frame).unwrap();
    block_on(task.step());

    assert!(link.frames().is_empty());
    assert_eq!(shared.pending_commands(), 0);
    assert_eq!(shared.state(), BleState::Ready);
}

#[test]
fn idle_poll_is_a_no_op() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    block_on(task.step());
    assert!(link.frames().is_empty());
    assert_eq!(shared.state(), BleState::Ready);
}

// ═══════════════════════════════════════════════════════════════════════════
// GATT link events
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn gatt_events_ignored_before_registration() {
    let shared = BleShared::new();
    shared.on_gatt(GattEvent::Connected {
        conn_id: 1,
        peer: [9; BT_ADDR_LEN],
    });
    assert_eq!(shared.links.len(), 0);
}

#[test]
fn gatt_connect_and_disconnect() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    let peer = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    shared.on_gatt(GattEvent::Connected { conn_id: 4, peer });
    block_on(task.step());
    assert_eq!(shared.state(), BleState::Connected);

    send(&mut task, &shared, IpcCommand::BtStatus);
    let frames = link.frames();
    assert_eq!(frames[0].command(), Some(IpcCommand::BtConnected));
    assert_eq!(&frames[0].data[..BT_ADDR_LEN], &peer);
    let status = StatusRecord::from_bytes(&frames[1].data).unwrap();
    assert_eq!(status.state, BleState::Connected);
    assert_eq!(status.num_connections, 1);
    assert_eq!(status.connected_addr, peer);

    shared.on_gatt(GattEvent::Disconnected { conn_id: 4 });
    block_on(task.step());
    assert_eq!(shared.state(), BleState::Ready);
    assert_eq!(link.codes().last(), Some(&IpcCommand::BtDisconnected));
}

#[test]
fn hardware_before_enable_is_not_ready() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut radio = MockRadio::new(&shared);
    radio.enable_event = None;

    let mut task = BleTask::with_timings(&shared, radio, &link, fast());
    let (started, queued) = block_on(join(
        task.start(),
        shared.queue_command(IpcFrame::new(IpcCommand::BtGetHardware)),
    ));

    assert_eq!(queued, Ok(()));
    assert_eq!(started, Err(Error::Ble(BleError::EnableTimeout)));
    let frames = summary(&link.frames());
    assert_eq!(frames[0], error_frame(BtErrorCode::NotReady));
    assert!(!link.codes().contains(&IpcCommand::BtHardwareInfo));
}

#[test]
fn hardware_after_stack_disabled_is_not_ready() {
    let shared = BleShared::new();
    let link = MockLink::default();
    let mut task = BleTask::with_timings(&shared, MockRadio::new(&shared), &link, fast());
    block_on(task.start()).unwrap();

    shared.on_management(ManagementEvent::Disabled);
    send(&mut task, &shared, IpcCommand::BtGetHardware);
    assert_eq!(summary(&link.frames()), [error_frame(BtErrorCode::NotReady)]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Command queue
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn refused_commands_are_logged() {
    use crate::logger::{Level, LOGGER};
    use std::string::String;
    use std::sync::Mutex as StdMutex;

    static WARNINGS: StdMutex<Vec<String>> = StdMutex::new(Vec::new());

    fn record(level: Level, msg: &str) {
        if level == Level::Warn {
            WARNINGS.lock().unwrap().push(msg.into());
        }
    }
    LOGGER.set_fallback(Some(record));

    let shared = BleShared::new();
    let frame = IpcFrame::new(IpcCommand::BtStatus);
    assert_eq!(shared.try_queue_command(frame), Err(Error::NotAccepting));

    shared.open_queue();
    for _ in 0..crate::config::BT_CMD_QUEUE_LENGTH {
        shared.try_queue_command(frame).unwrap();
    }
    assert_eq!(shared.try_queue_command(frame), Err(Error::CommandQueueFull));
    assert_eq!(shared.pending_commands(), crate::config::BT_CMD_QUEUE_LENGTH);

    let warnings = WARNINGS.lock().unwrap();
    assert!(warnings.iter().any(|w| w == "[BT] BT task not running, dropping cmd 0xE5"));
    assert!(warnings.iter().any(|w| w == "[BT] BT command queue full, dropping cmd 0xE5"));
}
