//! Persistent Storage Abstraction Traits
//!
//! The HOTP counter must survive reboots. MCU-specific crates implement
//! [`CounterStorage`] on their storage backend (NVS for ESP32, flash, ...).

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

/// Trait for persisting the HOTP counter
pub trait CounterStorage {
    /// Error type for storage operations
    type Error: std::fmt::Display;

    /// Get the stored counter, `None` if never written
    fn load_counter(&self) -> Result<Option<u64>, Self::Error>;

    /// Save the counter. Must be durable when this returns `Ok`.
    fn save_counter(&mut self, value: u64) -> Result<(), Self::Error>;
}

/// In-memory storage for hosts and tests.
///
/// Clones share the same slot, so a clone outlives a dropped service the
/// way flash outlives a reboot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage(Arc<Mutex<Option<u64>>>);

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(value: u64) -> Self {
        Self(Arc::new(Mutex::new(Some(value))))
    }

    pub fn value(&self) -> Option<u64> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CounterStorage for MemoryStorage {
    type Error = Infallible;

    fn load_counter(&self) -> Result<Option<u64>, Self::Error> {
        Ok(self.value())
    }

    fn save_counter(&mut self, value: u64) -> Result<(), Self::Error> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Ok(())
    }
}
