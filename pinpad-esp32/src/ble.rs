//! NimBLE GATT server for the pinpad service
//!
//! Command writes are stashed in the service from the NimBLE callback and
//! evaluated from the main loop. Characteristic values are pushed back by
//! `pinpad_mcu::Publisher` through the [`BleServer`] impl below.

use std::sync::Arc;

use esp32_nimble::utilities::mutex::Mutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    BLEAdvertisementData, BLEAdvertising, BLECharacteristic, BLEDevice, BLEError,
    NimbleProperties,
};
use log::*;
use pinpad_mcu::{BleServer, Clock, CounterStorage, PinpadService};
use pinpad_proto::Response;
use pinpad_proto::ble::{
    COMMAND_UUID, HOTP_COUNTER_UUID, RESPONSE_UUID, SECURITY_MODE_UUID, SERVICE_UUID, STATUS_UUID,
};

/// NimBLE keeps 128-bit UUIDs little-endian
fn ble_uuid(uuid: u128) -> BleUuid {
    BleUuid::from_uuid128(uuid.to_le_bytes())
}

/// Handles to the characteristics the main loop updates
pub struct NimbleServer {
    advertising: &'static Mutex<BLEAdvertising>,
    status: Arc<Mutex<BLECharacteristic>>,
    response: Arc<Mutex<BLECharacteristic>>,
    counter: Arc<Mutex<BLECharacteristic>>,
}

/// Register the pinpad GATT service and wire its callbacks to `service`
pub fn start_pinpad_server<S, C>(
    device_name: &str,
    service: Arc<PinpadService<S, C>>,
) -> Result<NimbleServer, BLEError>
where
    S: CounterStorage + Send + 'static,
    C: Clock + 'static,
{
    let ble_device = BLEDevice::take();
    BLEDevice::set_device_name(device_name)?;

    let server = ble_device.get_server();

    server.on_connect(|server, desc| {
        info!("BLE client connected");
        let _ = server.update_conn_params(desc.conn_handle(), 24, 48, 0, 60);
    });

    let disconnect_service = service.clone();
    server.on_disconnect(move |_desc, _reason| {
        info!("BLE client disconnected");
        disconnect_service.on_client_disconnect();
    });

    let gatt = server.create_service(ble_uuid(SERVICE_UUID));

    let status = gatt.lock().create_characteristic(
        ble_uuid(STATUS_UUID),
        NimbleProperties::READ | NimbleProperties::NOTIFY,
    );

    // Command characteristic (write with response)
    let command_service = service.clone();
    let command = gatt
        .lock()
        .create_characteristic(ble_uuid(COMMAND_UUID), NimbleProperties::WRITE);
    command.lock().on_write(move |args| {
        let data = args.recv_data();
        debug!("BLE: command write ({} bytes)", data.len());
        match command_service.on_write(data) {
            Some(Response::Busy) => warn!("BLE: command dropped, previous one still evaluating"),
            Some(_) => warn!("BLE: command dropped, service stopped"),
            None => {}
        }
    });

    let response = gatt.lock().create_characteristic(
        ble_uuid(RESPONSE_UUID),
        NimbleProperties::READ | NimbleProperties::NOTIFY,
    );

    // Security mode never changes after boot
    let mode = gatt
        .lock()
        .create_characteristic(ble_uuid(SECURITY_MODE_UUID), NimbleProperties::READ);
    mode.lock().set_value(service.on_mode_read().as_bytes());

    let counter = gatt
        .lock()
        .create_characteristic(ble_uuid(HOTP_COUNTER_UUID), NimbleProperties::READ);

    Ok(NimbleServer {
        advertising: ble_device.get_advertising(),
        status,
        response,
        counter,
    })
}

impl BleServer for NimbleServer {
    type Error = BLEError;

    fn start_advertising(&mut self, device_name: &str) -> Result<(), BLEError> {
        self.advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(device_name)
                .add_service_uuid(ble_uuid(SERVICE_UUID)),
        )?;
        self.advertising.lock().start()?;
        info!("BLE advertising started as '{}'", device_name);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), BLEError> {
        self.advertising.lock().stop()?;
        info!("BLE advertising stopped");
        Ok(())
    }

    fn set_status(&mut self, status: &[u8]) -> Result<(), BLEError> {
        let mut characteristic = self.status.lock();
        characteristic.set_value(status);
        characteristic.notify();
        Ok(())
    }

    fn set_response(&mut self, response: &[u8]) -> Result<(), BLEError> {
        let mut characteristic = self.response.lock();
        characteristic.set_value(response);
        characteristic.notify();
        Ok(())
    }

    fn set_counter(&mut self, counter: &[u8]) -> Result<(), BLEError> {
        self.counter.lock().set_value(counter);
        Ok(())
    }
}
