//! Integration tests for bt2ipc host-testable logic.
//!
//! Frames enter through the inbound router, the same path the UART receive
//! task uses, and leave through an in-memory link.

use std::cell::RefCell;

use bt2ipc::ble::{AddrKind, AdvEventType, AdvReport, BleState, ScanRecord, StatusRecord};
use bt2ipc::config::{StackConfig, BT_ADDR_LEN};
use bt2ipc::ipc::inbound::route;
use bt2ipc::logger::{ForwardSink, LogSink, LogTargets};
use bt2ipc::{
    BleError, BleShared, BleTask, IpcCommand, IpcFrame, IpcLink, Level, LinkError, Logger,
    ManagementEvent, RadioStack, TaskTimings,
};
use embassy_futures::block_on;
use embassy_time::Duration;

/// Radio that reports one fixed advertiser per scan.
struct OneBeacon<'a> {
    shared: &'a BleShared,
}

impl RadioStack for OneBeacon<'_> {
    type Error = BleError;

    fn init(&mut self, _config: &StackConfig) -> Result<(), BleError> {
        self.shared.on_management(ManagementEvent::Enabled(Ok(())));
        Ok(())
    }

    fn observe(&mut self, enable: bool, _duration_secs: u8) -> Result<(), BleError> {
        if enable {
            let data = [0x07, 0x09, b'B', b'e', b'a', b'c', b'o', b'n'];
            self.shared.on_scan_report(&AdvReport {
                address: [0x10, 0x20, 0x30, 0x40, 0x50, 0x60],
                addr_kind: AddrKind::Public,
                rssi: -58,
                event_type: AdvEventType::ConnectableUndirected,
                data: &data,
            });
            self.shared.on_scan_complete();
        }
        Ok(())
    }

    fn register_gatt(&mut self) -> Result<(), BleError> {
        Ok(())
    }

    fn local_address(&mut self) -> [u8; BT_ADDR_LEN] {
        [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]
    }

    fn chip_name(&self) -> &'static str {
        "nRF52840"
    }

    fn firmware_version(&self) -> &'static str {
        "S140 7.3.0"
    }
}

#[derive(Default)]
struct Recorder {
    sent: RefCell<Vec<IpcFrame>>,
}

impl IpcLink for Recorder {
    fn try_send(&self, frame: &IpcFrame) -> Result<(), LinkError> {
        self.sent.borrow_mut().push(*frame);
        Ok(())
    }
}

fn timings() -> TaskTimings {
    TaskTimings {
        enable_timeout: Duration::from_millis(200),
        command_poll: Duration::from_millis(20),
        scan_duration_secs: 0,
        scan_watchdog_margin: Duration::from_millis(50),
        result_pacing: Duration::from_millis(0),
    }
}

#[test]
fn peer_scan_request_yields_results_then_complete() {
    let shared = BleShared::new();
    let logger = Logger::new();
    let link = Recorder::default();
    let mut task = BleTask::with_timings(&shared, OneBeacon { shared: &shared }, &link, timings());
    block_on(task.start()).expect("stack should come up");

    block_on(route(&shared, &logger, &IpcFrame::new(IpcCommand::BtScanStart))).unwrap();
    block_on(task.step());

    let sent = link.sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].command(), Some(IpcCommand::BtScanResult));
    assert_eq!(sent[0].value, 0);
    let record = ScanRecord::from_bytes(&sent[0].data).expect("record payload");
    assert_eq!(record.name_str(), "Beacon");
    assert_eq!(record.rssi, -58);
    assert!(record.is_connectable());

    assert_eq!(sent[1].command(), Some(IpcCommand::BtScanComplete));
    assert_eq!(sent[1].value, 1);
    assert_eq!(shared.state(), BleState::Ready);
}

#[test]
fn peer_status_request_reports_ready_stack() {
    let shared = BleShared::new();
    let logger = Logger::new();
    let link = Recorder::default();
    let mut task = BleTask::with_timings(&shared, OneBeacon { shared: &shared }, &link, timings());
    block_on(task.start()).unwrap();

    block_on(route(&shared, &logger, &IpcFrame::new(IpcCommand::BtStatus))).unwrap();
    block_on(task.step());

    let sent = link.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command(), Some(IpcCommand::BtStatus));
    let status = StatusRecord::from_bytes(&sent[0].data).expect("status payload");
    assert_eq!(status.state, BleState::Ready);
    assert_eq!(status.num_connections, 0);
    assert!(!status.is_scanning);
}

#[test]
fn log_lines_are_forwarded_as_ipc_frames() {
    let logger = Logger::new();
    logger.init();
    logger.set_level(Level::Debug);
    logger.set_targets(LogTargets::IPC);
    logger.log(Level::Warn, format_args!("radio temp {}C", 41));
    logger.log(Level::Verbose, format_args!("filtered"));

    let link = Recorder::default();
    let mut forward = ForwardSink::new(&link);
    let mut sinks: [&mut dyn LogSink; 1] = [&mut forward];
    logger.process(&mut sinks);

    let sent = link.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command(), Some(IpcCommand::LogWarn));
    assert_eq!(sent[0].value, Level::Warn as u32);
    assert_eq!(sent[0].text(), "radio temp 41C");
}
