//! bt2ipc firmware entry point (nRF52840 + S140).
//!
//! Wires the host-testable core to the hardware: the IPC UART to the peer
//! processor, the console UART, the SSD1306 log view and the SoftDevice.

#![no_std]
#![no_main]

mod softdevice;
mod uart;
mod ui;

use bt2ipc::config::{CONSOLE_BAUD, IPC_UART_BAUD};
use bt2ipc::logger::{ConsoleSink, ForwardSink, WidgetSink};
use bt2ipc::{BleShared, BleTask, Level, LogSink, LogTargets, LOGGER};
use core::cell::RefCell;
use embassy_executor::Spawner;
use embassy_nrf::interrupt::{self, InterruptExt as _, Priority};
use embassy_nrf::peripherals::TWISPI0;
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::uarte::{self, Uarte};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::softdevice::SoftdeviceRadio;
use crate::uart::{ConsoleWriter, UartLink};
use crate::ui::display::{self, Display, OledLog};

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
    UARTE1 => uarte::InterruptHandler<peripherals::UARTE1>;
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

static BLE: BleShared = BleShared::new();

type OledI2c = Twim<'static, TWISPI0>;
type Console = ConsoleSink<ConsoleWriter>;

/// Console UART until the log task takes it over.
static BOOT_CONSOLE: Mutex<CriticalSectionRawMutex, RefCell<Option<Console>>> =
    Mutex::new(RefCell::new(None));

/// Used until the log pipeline is initialised. Falls back to RTT while the
/// console UART is not up yet.
fn boot_fallback(level: Level, msg: &str) {
    BOOT_CONSOLE.lock(|console| match console.borrow_mut().as_mut() {
        Some(console) => console.write_line(level, msg),
        None => defmt::println!("{}{}", level.prefix(), msg),
    });
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    LOGGER.set_fallback(Some(boot_fallback));

    // P0, P1 and P4 belong to the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    interrupt::UARTE0_UART0.set_priority(Priority::P3);
    interrupt::UARTE1.set_priority(Priority::P2);
    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(Priority::P3);

    let mut console_cfg = uarte::Config::default();
    console_cfg.baudrate = uart::baudrate(CONSOLE_BAUD);
    let console = Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, console_cfg);
    let (console_tx, _console_rx) = console.split();
    BOOT_CONSOLE.lock(|c| c.replace(Some(ConsoleSink::new(ConsoleWriter::new(console_tx)))));

    let mut ipc_cfg = uarte::Config::default();
    ipc_cfg.baudrate = uart::baudrate(IPC_UART_BAUD);
    let ipc = Uarte::new(p.UARTE1, Irqs, p.P1_01, p.P1_02, ipc_cfg);
    let (ipc_tx, ipc_rx) = ipc.split();

    static LINK: StaticCell<UartLink> = StaticCell::new();
    let link: &'static UartLink = LINK.init(UartLink::new(ipc_tx));

    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    let oled = display::init(i2c);

    bt2ipc::log_info!("console up, starting log pipeline");

    // IPC forwarding stays off: it shares the UART with paced scan results.
    LOGGER.set_targets(LogTargets::CONSOLE | LogTargets::WIDGET);
    LOGGER.init();
    spawner.must_spawn(log_task(oled, link));
    spawner.must_spawn(uart::ipc_rx_task(ipc_rx, &BLE));

    let radio = SoftdeviceRadio::new(spawner, &BLE);
    spawner.must_spawn(ble_task(radio, link));

    bt2ipc::log_info!("bt2ipc {} up", env!("CARGO_PKG_VERSION"));
}

#[embassy_executor::task]
async fn ble_task(radio: SoftdeviceRadio, link: &'static UartLink) {
    let err = BleTask::new(&BLE, radio, link).run().await;
    defmt::error!("BLE task stopped: {:?}", err);
}

#[embassy_executor::task]
async fn log_task(oled: Display<OledI2c>, link: &'static UartLink) {
    let Some(mut console) = BOOT_CONSOLE.lock(|c| c.borrow_mut().take()) else {
        defmt::error!("console UART missing, log task not started");
        return;
    };
    let mut widget = WidgetSink::new(OledLog::new(oled));
    let mut forward = ForwardSink::new(link);
    let mut sinks: [&mut dyn LogSink; 3] = [&mut console, &mut widget, &mut forward];
    LOGGER.run(&mut sinks).await;
}
