//! Nordic S140 SoftDevice adapter.
//!
//! `init` enables the SoftDevice from the static [`StackConfig`] and spawns
//! the two tasks that keep it running: the SoftDevice event loop and the
//! radio task, which runs one `central::scan` per request and feeds every
//! advertising report into the [`BleShared`] hub.

use bt2ipc::ble::radio::{ManagementEvent, RadioStack};
use bt2ipc::ble::{AddrKind, AdvEventType, AdvReport};
use bt2ipc::config::{StackConfig, BT_ADDR_LEN};
use bt2ipc::{BleError, BleShared};
use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::central::{self, ScanConfig, ScanError};
use nrf_softdevice::{self as sd, raw, Softdevice};

/// Observation window requested by the BLE task (seconds).
static SCAN_REQUEST: Signal<CriticalSectionRawMutex, u8> = Signal::new();
static SCAN_STOP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub struct SoftdeviceRadio {
    spawner: Spawner,
    shared: &'static BleShared,
    sd: Option<&'static Softdevice>,
}

impl SoftdeviceRadio {
    pub fn new(spawner: Spawner, shared: &'static BleShared) -> Self {
        Self {
            spawner,
            shared,
            sd: None,
        }
    }
}

impl RadioStack for SoftdeviceRadio {
    type Error = BleError;

    fn init(&mut self, config: &StackConfig) -> Result<(), BleError> {
        let sd = Softdevice::enable(&softdevice_config(config));
        self.spawner
            .spawn(softdevice_task(sd))
            .map_err(|_| BleError::StackInit)?;
        self.spawner
            .spawn(radio_task(sd, self.shared, !config.passive_scan))
            .map_err(|_| BleError::StackInit)?;
        self.sd = Some(sd);

        info!("SoftDevice enabled as '{}'", config.device_name);
        self.shared.on_management(ManagementEvent::Enabled(Ok(())));
        Ok(())
    }

    fn observe(&mut self, enable: bool, duration_secs: u8) -> Result<(), BleError> {
        if self.sd.is_none() {
            return Err(BleError::NotReady);
        }
        if enable {
            SCAN_STOP.reset();
            SCAN_REQUEST.signal(duration_secs);
        } else {
            SCAN_STOP.signal(());
        }
        Ok(())
    }

    fn register_gatt(&mut self) -> Result<(), BleError> {
        // Scan-only role: the gateway never initiates a connection, so the
        // SoftDevice raises no GATT link events for the hub.
        Ok(())
    }

    fn local_address(&mut self) -> [u8; BT_ADDR_LEN] {
        self.sd
            .map(|sd| sd::ble::get_address(sd).bytes())
            .unwrap_or([0; BT_ADDR_LEN])
    }

    fn chip_name(&self) -> &'static str {
        "nRF52840"
    }

    fn firmware_version(&self) -> &'static str {
        "S140 7.3.0"
    }
}

fn softdevice_config(config: &StackConfig) -> sd::Config {
    let name = config.device_name.as_bytes();
    sd::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: config.max_simultaneous_links,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: config.max_rx_pdu_size,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: config.max_simultaneous_links,
            central_sec_count: config.bonding_db_size,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: name.as_ptr() as _,
            current_len: name.len() as u16,
            max_len: name.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// Run one observation per request until it times out or is stopped, then
/// deliver the terminal marker.
#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice, shared: &'static BleShared, active: bool) -> ! {
    loop {
        let secs = SCAN_REQUEST.wait().await;
        let config = ScanConfig {
            active,
            timeout: u16::from(secs) * 100,
            ..Default::default()
        };

        let scan = central::scan(sd, &config, |params| {
            let data =
                unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
            shared.on_scan_report(&AdvReport {
                address: params.peer_addr.addr,
                addr_kind: addr_kind(&params.peer_addr),
                rssi: params.rssi,
                event_type: event_type(&params.type_),
                data,
            });
            None::<()>
        });

        match select(scan, SCAN_STOP.wait()).await {
            Either::First(Ok(())) | Either::First(Err(ScanError::Timeout)) => {}
            Either::First(Err(e)) => warn!("scan ended with error: {:?}", e),
            Either::Second(()) => info!("scan stopped on request"),
        }
        shared.on_scan_complete();
    }
}

fn addr_kind(addr: &raw::ble_gap_addr_t) -> AddrKind {
    let identity = addr.addr_id_peer() != 0;
    match (addr.addr_type() as u32, identity) {
        (raw::BLE_GAP_ADDR_TYPE_PUBLIC, false) => AddrKind::Public,
        (raw::BLE_GAP_ADDR_TYPE_PUBLIC, true) => AddrKind::PublicId,
        (_, false) => AddrKind::Random,
        (_, true) => AddrKind::RandomId,
    }
}

fn event_type(t: &raw::ble_gap_adv_report_type_t) -> AdvEventType {
    if t.scan_response() != 0 {
        AdvEventType::ScanResponse
    } else if t.connectable() != 0 && t.directed() != 0 {
        AdvEventType::ConnectableDirected
    } else if t.connectable() != 0 {
        AdvEventType::ConnectableUndirected
    } else if t.scannable() != 0 {
        AdvEventType::ScannableUndirected
    } else {
        AdvEventType::NonConnectableUndirected
    }
}
