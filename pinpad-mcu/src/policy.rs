//! Security mode policy - decides whether a submitted code is good

use std::num::NonZeroU64;

use pinpad_otp::{verify_hotp, verify_totp, Digits};
use pinpad_proto::SecurityMode;
use subtle::ConstantTimeEq;

use crate::config::{PinpadConfig, Security};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// `matched_counter` is set in HOTP mode
    Accepted { matched_counter: Option<u64> },
    Rejected,
}

impl VerificationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerificationResult::Accepted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    security: Security,
    digits: Digits,
    lookahead: u64,
    period: NonZeroU64,
    totp_tolerance: u64,
}

impl SecurityPolicy {
    pub fn new(config: &PinpadConfig) -> Self {
        Self {
            security: config.security.clone(),
            digits: config.digits,
            lookahead: config.lookahead,
            period: config.period,
            totp_tolerance: config.totp_tolerance,
        }
    }

    pub fn describe_mode(&self) -> SecurityMode {
        self.security.mode()
    }

    /// Check `submitted` against the configured mode.
    ///
    /// `counter` is the stored HOTP counter, `now` the Unix time for TOTP.
    /// Bad input of any shape is `Rejected`.
    pub fn verify(&self, submitted: &[u8], counter: u64, now: u64) -> VerificationResult {
        if submitted.is_empty() {
            return VerificationResult::Rejected;
        }

        match &self.security {
            Security::None { pin } => {
                if bool::from(pin.as_bytes().ct_eq(submitted)) {
                    VerificationResult::Accepted { matched_counter: None }
                } else {
                    VerificationResult::Rejected
                }
            }
            Security::Hotp { secret } => {
                let result = verify_hotp(secret, submitted, counter, self.lookahead, self.digits);
                match result.matched {
                    Some(matched) => {
                        VerificationResult::Accepted { matched_counter: Some(matched) }
                    }
                    None => VerificationResult::Rejected,
                }
            }
            Security::Totp { secret } => {
                let ok = verify_totp(
                    secret,
                    submitted,
                    now,
                    self.period,
                    self.totp_tolerance,
                    self.digits,
                );
                if ok {
                    VerificationResult::Accepted { matched_counter: None }
                } else {
                    VerificationResult::Rejected
                }
            }
        }
    }
}
