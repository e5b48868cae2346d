//! Pinpad OTP engine
//!
//! RFC 4226 (HOTP) and RFC 6238 (TOTP) codes over HMAC-SHA1, as produced by
//! common authenticator apps. Codes are compared as the fixed-width digit
//! strings that travel over BLE, never as integers.

mod clock;
mod code;
mod hotp;
mod secret;
mod totp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{Code, Digits};
pub use hotp::{compute_hotp, verify_hotp, HotpVerification};
pub use secret::SharedSecret;
pub use totp::{compute_totp, time_step, verify_totp, DEFAULT_PERIOD};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("shared secret is empty")]
    EmptySecret,
    #[error("invalid base32 secret: {0}")]
    InvalidBase32(String),
    #[error("code length must be 6, 7 or 8 digits, got {0}")]
    InvalidDigits(u8),
}
