//! RFC 4226 counter based codes

use crate::{Code, Digits, SharedSecret};

/// Outcome of a HOTP verification over a lookahead window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotpVerification {
    /// The first counter in the window whose code matched
    pub matched: Option<u64>,
}

impl HotpVerification {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

pub fn compute_hotp(secret: &SharedSecret, counter: u64, digits: Digits) -> Code {
    let digest = secret.sign(&counter.to_be_bytes());
    Code::from_value(truncate(&digest) % digits.modulus(), digits)
}

/// Try `expected_counter ..= expected_counter + lookahead` in ascending order.
///
/// The window stops at `u64::MAX`. A malformed submission never matches.
pub fn verify_hotp(
    secret: &SharedSecret,
    submitted: &[u8],
    expected_counter: u64,
    lookahead: u64,
    digits: Digits,
) -> HotpVerification {
    if !digits.is_well_formed(submitted) {
        return HotpVerification { matched: None };
    }

    for offset in 0..=lookahead {
        let Some(counter) = expected_counter.checked_add(offset) else {
            break;
        };
        if compute_hotp(secret, counter, digits).matches(submitted) {
            return HotpVerification { matched: Some(counter) };
        }
    }

    HotpVerification { matched: None }
}

/// Dynamic truncation (RFC 4226 section 5.3)
fn truncate(digest: &[u8; 20]) -> u32 {
    let offset = usize::from(digest[19] & 0x0f);
    u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ])
}
