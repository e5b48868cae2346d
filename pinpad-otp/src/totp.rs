//! RFC 6238 time based codes

use std::num::NonZeroU64;

use crate::{compute_hotp, Code, Digits, SharedSecret};

/// Default time step, in seconds
pub const DEFAULT_PERIOD: NonZeroU64 = NonZeroU64::new(30).unwrap();

pub fn time_step(timestamp: u64, period: NonZeroU64) -> u64 {
    timestamp / period.get()
}

pub fn compute_totp(
    secret: &SharedSecret,
    timestamp: u64,
    period: NonZeroU64,
    digits: Digits,
) -> Code {
    compute_hotp(secret, time_step(timestamp, period), digits)
}

/// Accept codes from the current step or up to `tolerance_steps` either side.
pub fn verify_totp(
    secret: &SharedSecret,
    submitted: &[u8],
    now: u64,
    period: NonZeroU64,
    tolerance_steps: u64,
    digits: Digits,
) -> bool {
    if !digits.is_well_formed(submitted) {
        return false;
    }

    let current = time_step(now, period);
    let matches = |step: u64| compute_hotp(secret, step, digits).matches(submitted);

    if matches(current) {
        return true;
    }
    for delta in 1..=tolerance_steps {
        if current.checked_sub(delta).is_some_and(matches) {
            return true;
        }
        if current.checked_add(delta).is_some_and(matches) {
            return true;
        }
    }
    false
}
