//! UART transports: the IPC link to the peer processor and the debug
//! console writer.

use core::fmt;

use bt2ipc::config::LOG_MSG_MAX_LEN;
use bt2ipc::error::LinkError;
use bt2ipc::ipc::{inbound, IPC_FRAME_LEN};
use bt2ipc::{BleShared, IpcFrame, IpcLink, LOGGER};
use embassy_nrf::peripherals::{UARTE0, UARTE1};
use embassy_nrf::uarte::{Baudrate, UarteRx, UarteTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

pub type IpcTx = UarteTx<'static, UARTE1>;
pub type IpcRx = UarteRx<'static, UARTE1>;
pub type ConsoleTx = UarteTx<'static, UARTE0>;

pub fn baudrate(bps: u32) -> Baudrate {
    match bps {
        9_600 => Baudrate::BAUD9600,
        57_600 => Baudrate::BAUD57600,
        230_400 => Baudrate::BAUD230400,
        460_800 => Baudrate::BAUD460800,
        921_600 => Baudrate::BAUD921600,
        1_000_000 => Baudrate::BAUD1M,
        _ => Baudrate::BAUD115200,
    }
}

/// Frame-at-a-time IPC sender shared by the BLE task and the log forwarder.
///
/// A send that finds another sender mid-frame reports `Busy`; callers retry
/// through [`IpcLink::send_retry`].
pub struct UartLink {
    tx: Mutex<CriticalSectionRawMutex, IpcTx>,
}

impl UartLink {
    pub fn new(tx: IpcTx) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl IpcLink for UartLink {
    fn try_send(&self, frame: &IpcFrame) -> Result<(), LinkError> {
        let mut tx = self.tx.try_lock().map_err(|_| LinkError::Busy)?;
        let mut buf = [0u8; IPC_FRAME_LEN];
        let len = frame.serialize(&mut buf);
        tx.blocking_write(&buf[..len]).map_err(|_| LinkError::Fault)
    }
}

/// Receive fixed-size frames from the peer and route them.
#[embassy_executor::task]
pub async fn ipc_rx_task(mut rx: IpcRx, shared: &'static BleShared) -> ! {
    let mut buf = [0u8; IPC_FRAME_LEN];
    loop {
        if let Err(e) = rx.read(&mut buf).await {
            defmt::warn!("IPC rx error: {:?}", e);
            continue;
        }
        let Some(frame) = IpcFrame::from_bytes(&buf) else {
            continue;
        };
        // Refusals are logged by the router.
        let _ = inbound::route(shared, &LOGGER, &frame).await;
    }
}

/// `fmt::Write` over the console UART.
///
/// EasyDMA only reads from RAM, so string literals are staged through a
/// local buffer before each write.
pub struct ConsoleWriter {
    tx: ConsoleTx,
}

impl ConsoleWriter {
    pub fn new(tx: ConsoleTx) -> Self {
        Self { tx }
    }
}

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut staging = [0u8; LOG_MSG_MAX_LEN];
        for chunk in s.as_bytes().chunks(staging.len()) {
            staging[..chunk.len()].copy_from_slice(chunk);
            self.tx
                .blocking_write(&staging[..chunk.len()])
                .map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
