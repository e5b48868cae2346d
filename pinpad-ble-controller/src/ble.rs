//! btleplug transport for the client session

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use pinpad_proto::ble::SERVICE_UUID;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::{Candidate, PinpadLink, Scanner};

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, SessionError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(SessionError::NoAdapter)
}

/// Scans through the first Bluetooth adapter
pub struct BtleScanner {
    adapter: Adapter,
    found: HashMap<String, Peripheral>,
}

impl BtleScanner {
    pub async fn new() -> Result<Self, SessionError> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter, found: HashMap::new() }
    }
}

impl Scanner for BtleScanner {
    type Link = BtleLink;

    async fn scan(&mut self, timeout: Duration) -> Result<Vec<Candidate>, SessionError> {
        let service = Uuid::from_u128(SERVICE_UUID);
        self.found.clear();

        self.adapter
            .start_scan(ScanFilter { services: vec![service] })
            .await?;
        tokio::time::sleep(timeout).await;

        let adapter = &self.adapter;
        let collected = collect_pinpads(adapter, service).await;
        let found = finish(collected, async {
            adapter.stop_scan().await.map_err(SessionError::from)
        })
        .await?;

        let mut candidates = Vec::with_capacity(found.len());
        for (candidate, peripheral) in found {
            self.found.insert(candidate.address.clone(), peripheral);
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    async fn connect(&mut self, candidate: &Candidate) -> Result<BtleLink, SessionError> {
        let peripheral = self
            .found
            .get(&candidate.address)
            .cloned()
            .ok_or_else(|| SessionError::DeviceGone(candidate.address.clone()))?;

        peripheral.connect().await?;
        debug!("Connected, discovering services");
        if let Err(e) = peripheral.discover_services().await {
            let disconnect = async { peripheral.disconnect().await.map_err(SessionError::from) };
            return finish(Err(e.into()), disconnect).await;
        }

        let characteristics = peripheral.characteristics().into_iter().collect();
        Ok(BtleLink { peripheral, characteristics })
    }
}

async fn collect_pinpads(
    adapter: &Adapter,
    service: Uuid,
) -> Result<Vec<(Candidate, Peripheral)>, SessionError> {
    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        // Some backends ignore the scan filter
        if !props.services.contains(&service) {
            trace!("Ignoring {} without pinpad service", peripheral.address());
            continue;
        }

        let address = peripheral.address().to_string();
        debug!("Found pinpad {} ({:?})", address, props.local_name);
        let candidate = Candidate { name: props.local_name, address, rssi: props.rssi };
        found.push((candidate, peripheral));
    }
    Ok(found)
}

/// Await `cleanup` whatever `work` produced.
///
/// A work error is returned over a cleanup error, which is then only logged.
async fn finish<T>(
    work: Result<T, SessionError>,
    cleanup: impl Future<Output = Result<(), SessionError>>,
) -> Result<T, SessionError> {
    let cleaned = cleanup.await;
    match (work, cleaned) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_error)) => {
            warn!("Cleanup after a failed BLE call also failed: {}", cleanup_error);
            Err(e)
        }
    }
}

/// A connected pinpad peripheral
pub struct BtleLink {
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
}

impl BtleLink {
    fn characteristic(&self, uuid: u128) -> Result<&Characteristic, SessionError> {
        let uuid = Uuid::from_u128(uuid);
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| SessionError::CharacteristicNotFound(uuid.to_string()))
    }
}

impl PinpadLink for BtleLink {
    async fn read(&mut self, characteristic: u128) -> Result<Vec<u8>, SessionError> {
        let characteristic = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    async fn write(&mut self, characteristic: u128, data: &[u8]) -> Result<(), SessionError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral
            .write(characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use pinpad_proto::ble::{COMMAND_UUID, HOTP_COUNTER_UUID};

    use super::*;

    #[test]
    fn characteristic_ids_print_in_canonical_form() {
        let service = Uuid::from_u128(SERVICE_UUID).to_string();
        assert_eq!(service, "0003cc02-25ce-4e26-a32f-8c1bfa900000");
        assert!(Uuid::from_u128(COMMAND_UUID).to_string().ends_with("-8c1bfa900002"));
        assert!(Uuid::from_u128(HOTP_COUNTER_UUID).to_string().ends_with("-8c1bfa900005"));
    }

    #[tokio::test]
    async fn cleanup_runs_after_success() {
        let cleaned = AtomicBool::new(false);
        let result = finish(Ok(7), async {
            cleaned.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_runs_after_failure_and_the_first_error_wins() {
        let cleaned = AtomicBool::new(false);
        let result: Result<(), _> = finish(Err(SessionError::NoDeviceFound), async {
            cleaned.store(true, Ordering::SeqCst);
            Err(SessionError::NoAdapter)
        })
        .await;

        assert!(matches!(result, Err(SessionError::NoDeviceFound)));
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported_after_success() {
        let result = finish(Ok("candidates"), async { Err(SessionError::NoAdapter) }).await;
        assert!(matches!(result, Err(SessionError::NoAdapter)));
    }
}
