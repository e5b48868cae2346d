//! BLE GATT Service traits for the Pinpad
//!
//! Protocol constants (UUIDs, encodings) are in pinpad_proto::ble.
//! This module provides the MCU-side seam to the BLE stack.

pub use pinpad_proto::ble::{
    COMMAND_UUID, HOTP_COUNTER_UUID, RESPONSE_UUID, SECURITY_MODE_UUID, SERVICE_UUID, STATUS_UUID,
};
use pinpad_otp::Clock;
use pinpad_proto::ble::counter;
use pinpad_proto::{Response, Status};

use crate::service::PinpadService;
use crate::storage::CounterStorage;

/// Trait for BLE GATT server implementations
///
/// MCU-specific crates implement this trait using their BLE stack.
pub trait BleServer {
    /// Error type for BLE operations
    type Error;

    /// Start BLE advertising with the given device name
    fn start_advertising(&mut self, device_name: &str) -> Result<(), Self::Error>;

    /// Stop BLE advertising
    fn stop_advertising(&mut self) -> Result<(), Self::Error>;

    /// Update the status characteristic value and notify subscribers
    fn set_status(&mut self, status: &[u8]) -> Result<(), Self::Error>;

    /// Update the response characteristic value and notify subscribers
    fn set_response(&mut self, response: &[u8]) -> Result<(), Self::Error>;

    /// Update the HOTP counter characteristic value
    fn set_counter(&mut self, counter: &[u8]) -> Result<(), Self::Error>;
}

/// Pushes changed service values to the GATT server.
///
/// Only values that differ from the last push are written, so subscribers
/// get one notification per change. Every finished evaluation pushes its
/// verdict, and every dropped write pushes `busy` after it, so a writer whose
/// command was dropped is told so even when the verdict was the same.
#[derive(Debug, Default)]
pub struct Publisher {
    status: Option<Status>,
    response: Option<Response>,
    counter: Option<u64>,
    evaluations: u64,
    busy_drops: u64,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync<S, C, B>(
        &mut self,
        service: &PinpadService<S, C>,
        server: &mut B,
    ) -> Result<(), B::Error>
    where
        S: CounterStorage,
        C: Clock,
        B: BleServer,
    {
        let status = service.status();
        if self.status != Some(status) {
            server.set_status(&[status.as_byte()])?;
            self.status = Some(status);
        }

        let evaluations = service.evaluations();
        if self.evaluations != evaluations {
            if let Some(outcome) = service.last_outcome() {
                server.set_response(outcome.as_bytes())?;
                self.response = Some(outcome);
            }
            self.evaluations = evaluations;
        }

        let busy_drops = service.busy_drops();
        if let Some(response) = service.last_response() {
            if self.response != Some(response) || self.busy_drops != busy_drops {
                server.set_response(response.as_bytes())?;
                self.response = Some(response);
            }
        }
        self.busy_drops = busy_drops;

        let value = service.on_counter_read();
        if self.counter != Some(value) {
            server.set_counter(&counter::encode(value))?;
            self.counter = Some(value);
        }
        Ok(())
    }
}
