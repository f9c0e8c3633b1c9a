//! Routing of frames received from the peer processor.

use super::{IpcCommand, IpcFrame};
use crate::ble::shared::BleShared;
use crate::error::Error;
use crate::log_debug;
use crate::logger::{Level, Logger};

/// Tag under which peer log lines are printed.
pub const PEER_LOG_TAG: &str = "PEER";

/// Deliver one inbound frame.
///
/// Bluetooth requests are queued for the BLE task (`STATUS` from the peer is
/// always a request). Peer log lines are re-emitted through `logger`;
/// `LOG_LEVEL` sets its level. Anything else is ignored.
pub async fn route(shared: &BleShared, logger: &Logger, frame: &IpcFrame) -> Result<(), Error> {
    let Some(cmd) = frame.command() else {
        log_debug!("ignoring unknown IPC command 0x{:02X}", frame.cmd);
        return Ok(());
    };

    if cmd.is_bt_request() {
        return shared.queue_command(*frame).await;
    }

    if cmd == IpcCommand::LogLevel {
        match Level::from_forward_value(frame.value) {
            Some(level) => logger.set_level(level),
            None => log_debug!("ignoring invalid log level {}", frame.value),
        }
        return Ok(());
    }

    if let Some(level) = cmd.log_level() {
        logger.log_tag(level, PEER_LOG_TAG, format_args!("{}", frame.text()));
        return Ok(());
    }

    log_debug!("ignoring IPC command {:?}", cmd);
    Ok(())
}
