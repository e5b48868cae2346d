//! BLE Pinpad for ESP32
//!
//! Exposes the pinpad GATT service over NimBLE and verifies PINs or one-time
//! codes written to it. An accepted code lights the LED on GPIO2 and pulses
//! the door relay on GPIO4.
//!
//! Device settings live in `config.rs`. In `totp` mode the device joins
//! Wi-Fi once at boot to get the time over SNTP.

mod ble;
mod config;
mod indicator;
mod storage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::PinDriver, prelude::Peripherals},
    nvs::EspDefaultNvsPartition,
    sntp::{EspSntp, SyncStatus},
    wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
use log::*;
use pinpad_mcu::{BleServer, PinpadService, Publisher, SecurityMode, TriggerError};

/// Main loop period; bounds how late a written command is evaluated
const LOOP_PERIOD: Duration = Duration::from_millis(20);

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("BLE Pinpad v0.1");
    info!("Initializing...");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = config::pinpad_config()?;

    // TOTP needs wall-clock time; keep Wi-Fi and SNTP alive for the whole run
    let _time_sync = if config.mode() == SecurityMode::Totp {
        let mut wifi = BlockingWifi::wrap(
            EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs.clone()))?,
            sys_loop,
        )?;
        connect_wifi(&mut wifi)?;
        let sntp = sync_time()?;
        Some((wifi, sntp))
    } else {
        None
    };

    let led = indicator::Led::new(PinDriver::output(peripherals.pins.gpio2)?);
    let relay = PinDriver::output(peripherals.pins.gpio4)?;
    info!("LED on GPIO2, relay on GPIO4");

    let storage = storage::NvsCounterStorage::open(&nvs)?;

    let service = Arc::new(
        PinpadService::builder(config, storage)
            .status_indicator(led)
            .on_accepted(indicator::relay_pulse(relay))
            .on_rejected(|| -> Result<(), TriggerError> {
                warn!("Wrong code entered");
                Ok(())
            })
            .build()?,
    );

    let mut server = ble::start_pinpad_server(config::DEVICE_NAME, service.clone())
        .map_err(|e| anyhow::anyhow!("BLE setup failed: {:?}", e))?;
    let mut publisher = Publisher::new();

    service.start();
    publisher
        .sync(&service, &mut server)
        .map_err(|e| anyhow::anyhow!("BLE update failed: {:?}", e))?;
    server
        .start_advertising(config::DEVICE_NAME)
        .map_err(|e| anyhow::anyhow!("BLE advertising failed: {:?}", e))?;

    loop {
        std::thread::sleep(LOOP_PERIOD);

        if let Some(Err(e)) = service.poll() {
            error!("Command evaluation failed: {}", e);
        }
        service.tick(Instant::now());

        if let Err(e) = publisher.sync(&service, &mut server) {
            warn!("BLE update failed: {:?}", e);
        }
    }
}

fn connect_wifi(wifi: &mut BlockingWifi<EspWifi<'static>>) -> anyhow::Result<()> {
    use esp_idf_svc::wifi::AuthMethod;

    // Force WPA2 to avoid SAE negotiation issues with WPA2/WPA3 mixed networks
    let wifi_config = Configuration::Client(ClientConfiguration {
        ssid: config::WIFI_SSID
            .try_into()
            .map_err(|_| anyhow::anyhow!("SSID too long"))?,
        password: config::WIFI_PASS
            .try_into()
            .map_err(|_| anyhow::anyhow!("Password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    });

    wifi.set_configuration(&wifi_config)?;
    wifi.start()?;
    info!("WiFi started, connecting to {}...", config::WIFI_SSID);

    wifi.connect()?;
    info!("WiFi connected!");

    wifi.wait_netif_up()?;
    info!("Network interface is up");

    Ok(())
}

/// Block until SNTP has set the system clock
fn sync_time() -> anyhow::Result<EspSntp<'static>> {
    let sntp = EspSntp::new_default()?;
    info!("Waiting for SNTP time sync...");

    let mut waited = Duration::ZERO;
    while sntp.get_sync_status() != SyncStatus::Completed {
        std::thread::sleep(Duration::from_millis(100));
        waited += Duration::from_millis(100);
        if waited >= Duration::from_secs(30) {
            anyhow::bail!("SNTP sync timed out");
        }
    }
    info!("Time synchronized");
    Ok(sntp)
}
