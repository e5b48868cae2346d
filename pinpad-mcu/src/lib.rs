//! Pinpad MCU Library
//!
//! The peripheral side of the BLE pinpad, independent of any particular BLE
//! stack or chip.
//!
//! This crate provides:
//! - Configuration and the security mode policy (PIN, HOTP, TOTP)
//! - The HOTP counter store with replay protection
//! - The pinpad service state machine and its accept/reject side effects
//! - Traits for the BLE server, counter storage and status indicator
//!
//! # MCU implementations
//! - ESP32: see `pinpad-esp32`

pub mod ble;
pub mod config;
pub mod counter;
pub mod indicator;
pub mod policy;
pub mod service;
pub mod storage;

pub use ble::{BleServer, Publisher};
pub use config::{ConfigError, PinpadConfig, Security};
pub use counter::{Advance, CounterError, CounterStore};
pub use indicator::{
    IndicatorError, Level, StatusIndicator, Trigger, TriggerError, TriggerKind, Triggers,
};
pub use policy::{SecurityPolicy, VerificationResult};
pub use service::{PinpadError, PinpadService, PinpadServiceBuilder};
pub use storage::{CounterStorage, MemoryStorage};

pub use pinpad_otp::{Clock, Digits, ManualClock, SharedSecret, SystemClock};
pub use pinpad_proto::{Response, SecurityMode, Status};
