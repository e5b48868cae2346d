//! Pinpad BLE Controller
//!
//! BLE client that finds a pinpad peripheral, works out which code it
//! expects and submits it.
//!
//! # Example
//!
//! ```ignore
//! use pinpad_ble_controller::{ble::BtleScanner, session, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scanner = BtleScanner::new().await?;
//!
//!     // List nearby pinpads
//!     for device in session::list(&mut scanner, SessionOptions::default().timeout).await? {
//!         println!("{} ({})", device.display_name(), device.address);
//!     }
//!
//!     // Submit a code, prompting on the terminal
//!     let submission = session::run(
//!         &mut scanner,
//!         &mut my_operator,
//!         &SessionOptions::default(),
//!         &pinpad_otp::SystemClock,
//!     )
//!     .await?;
//!     println!("submitted to {}", submission.device.address);
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod operator;
pub mod session;

pub use error::SessionError;
pub use operator::Operator;
pub use session::{Candidate, PinpadLink, Scanner, SessionOptions, Submission};
