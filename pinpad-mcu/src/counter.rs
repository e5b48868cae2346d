//! HOTP counter store
//!
//! Reads come from an atomic cache so they never wait on a verification in
//! progress. Advances persist first and only then become visible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, warn};

use crate::storage::CounterStorage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    #[error("refusing to move counter backward from {current} to {requested}")]
    Backward { current: u64, requested: u64 },
    #[error("counter exhausted")]
    Exhausted,
    #[error("counter storage failed: {0}")]
    Storage(String),
    #[error("counter storage lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Advanced { from: u64, to: u64 },
    /// The counter already sits at `matched + 1`
    Unchanged,
}

pub struct CounterStore<S> {
    storage: Mutex<S>,
    current: AtomicU64,
}

impl<S: CounterStorage> CounterStore<S> {
    /// Load the persisted counter, starting at 0 if nothing was stored
    pub fn open(storage: S) -> Result<Self, CounterError> {
        let current = storage
            .load_counter()
            .map_err(|e| CounterError::Storage(e.to_string()))?
            .unwrap_or(0);
        debug!("HOTP counter loaded: {}", current);
        Ok(Self {
            storage: Mutex::new(storage),
            current: AtomicU64::new(current),
        })
    }

    pub fn read(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Move the counter past an accepted code at `matched`.
    pub fn advance_to(&self, matched: u64) -> Result<Advance, CounterError> {
        let target = matched.checked_add(1).ok_or(CounterError::Exhausted)?;
        let mut storage = self.storage.lock().map_err(|_| CounterError::Poisoned)?;

        let current = self.current.load(Ordering::SeqCst);
        if target == current {
            return Ok(Advance::Unchanged);
        }
        if target < current {
            warn!("HOTP counter advance refused: {} -> {}", current, target);
            return Err(CounterError::Backward { current, requested: target });
        }

        storage
            .save_counter(target)
            .map_err(|e| CounterError::Storage(e.to_string()))?;
        self.current.store(target, Ordering::SeqCst);
        debug!("HOTP counter advanced: {} -> {}", current, target);
        Ok(Advance::Advanced { from: current, to: target })
    }
}
