//! Pinpad wire protocol - GATT identifiers and characteristic value encodings
//!
//! Shared by the peripheral (`pinpad-mcu`, `pinpad-esp32`) and the host client
//! (`pinpad-ble-controller`), so both sides agree on every byte.

pub mod ble;

pub use ble::{ProtoError, Response, SecurityMode, Status};
