//! HOTP counter persisted in NVS

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_svc::sys::EspError;
use pinpad_mcu::CounterStorage;

const NVS_NAMESPACE: &str = "pinpad";
const KEY_COUNTER: &str = "hotp_counter";

pub struct NvsCounterStorage {
    nvs: EspNvs<NvsDefault>,
}

impl NvsCounterStorage {
    pub fn open(partition: &EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl CounterStorage for NvsCounterStorage {
    type Error = EspError;

    fn load_counter(&self) -> Result<Option<u64>, EspError> {
        self.nvs.get_u64(KEY_COUNTER)
    }

    fn save_counter(&mut self, value: u64) -> Result<(), EspError> {
        self.nvs.set_u64(KEY_COUNTER, value)
    }
}
