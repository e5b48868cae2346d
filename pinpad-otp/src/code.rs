use subtle::ConstantTimeEq;

use crate::OtpError;

/// Number of decimal digits in a code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digits(u8);

impl Digits {
    pub const SIX: Digits = Digits(6);
    pub const EIGHT: Digits = Digits(8);

    pub fn new(digits: u8) -> Result<Self, OtpError> {
        match digits {
            6..=8 => Ok(Digits(digits)),
            other => Err(OtpError::InvalidDigits(other)),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub(crate) fn modulus(&self) -> u32 {
        10u32.pow(u32::from(self.0))
    }

    /// True when `submitted` has the right width and only ASCII digits
    pub fn is_well_formed(&self, submitted: &[u8]) -> bool {
        submitted.len() == usize::from(self.0) && submitted.iter().all(u8::is_ascii_digit)
    }
}

impl Default for Digits {
    fn default() -> Self {
        Self::SIX
    }
}

/// A fixed-width one-time code, leading zeros preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code(String);

impl Code {
    pub(crate) fn from_value(value: u32, digits: Digits) -> Self {
        Code(format!("{:0width$}", value, width = usize::from(digits.get())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Constant-time comparison against the bytes a client submitted
    pub fn matches(&self, submitted: &[u8]) -> bool {
        self.as_bytes().ct_eq(submitted).into()
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
