//! Pinpad configuration
//!
//! Built once at startup and validated before the service is constructed.

use std::num::NonZeroU64;
use std::time::Duration;

use pinpad_otp::{Digits, OtpError, SharedSecret, DEFAULT_PERIOD};
use pinpad_proto::ble::INPUT_MAX_LEN;
use pinpad_proto::SecurityMode;

pub const DEFAULT_LOOKAHEAD: u64 = 5;
pub const MAX_LOOKAHEAD: u64 = 100;
pub const DEFAULT_TOTP_TOLERANCE: u64 = 1;
pub const MAX_TOTP_TOLERANCE: u64 = 10;
/// How long an accepted/rejected status is held before returning to idle
pub const DEFAULT_STATE_HOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("security mode {0} requires a shared secret")]
    MissingSecret(SecurityMode),
    #[error("security mode none requires a pin")]
    MissingPin,
    #[error("pin must be 1 to 255 ASCII digits")]
    InvalidPin,
    #[error("invalid secret: {0}")]
    InvalidSecret(#[from] OtpError),
    #[error("lookahead {0} exceeds maximum of 100")]
    LookaheadTooLarge(u64),
    #[error("totp tolerance {0} exceeds maximum of 10 steps")]
    ToleranceTooLarge(u64),
}

/// Secret material for the configured security mode
#[derive(Debug, Clone)]
pub enum Security {
    None { pin: String },
    Hotp { secret: SharedSecret },
    Totp { secret: SharedSecret },
}

impl Security {
    /// Assemble from loosely typed settings (firmware constants, env vars)
    ///
    /// OTP secrets are operator passwords, as entered in the client.
    pub fn from_parts(
        mode: SecurityMode,
        pin: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ConfigError> {
        match mode {
            SecurityMode::None => {
                let pin = pin.ok_or(ConfigError::MissingPin)?;
                Ok(Security::None { pin: pin.to_string() })
            }
            SecurityMode::Hotp | SecurityMode::Totp => {
                let password = password
                    .filter(|p| !p.is_empty())
                    .ok_or(ConfigError::MissingSecret(mode))?;
                let secret = SharedSecret::from_password(password)?;
                Ok(if mode == SecurityMode::Hotp {
                    Security::Hotp { secret }
                } else {
                    Security::Totp { secret }
                })
            }
        }
    }

    pub fn mode(&self) -> SecurityMode {
        match self {
            Security::None { .. } => SecurityMode::None,
            Security::Hotp { .. } => SecurityMode::Hotp,
            Security::Totp { .. } => SecurityMode::Totp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinpadConfig {
    pub security: Security,
    pub digits: Digits,
    /// Extra HOTP counters tried past the stored one
    pub lookahead: u64,
    pub period: NonZeroU64,
    /// TOTP steps accepted either side of the current one
    pub totp_tolerance: u64,
    pub state_hold: Duration,
}

impl PinpadConfig {
    pub fn new(security: Security) -> Self {
        Self {
            security,
            digits: Digits::default(),
            lookahead: DEFAULT_LOOKAHEAD,
            period: DEFAULT_PERIOD,
            totp_tolerance: DEFAULT_TOTP_TOLERANCE,
            state_hold: DEFAULT_STATE_HOLD,
        }
    }

    pub fn pin(pin: impl Into<String>) -> Self {
        Self::new(Security::None { pin: pin.into() })
    }

    pub fn hotp(secret: SharedSecret) -> Self {
        Self::new(Security::Hotp { secret })
    }

    pub fn totp(secret: SharedSecret) -> Self {
        Self::new(Security::Totp { secret })
    }

    pub fn with_lookahead(mut self, lookahead: u64) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_digits(mut self, digits: Digits) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_totp_tolerance(mut self, steps: u64) -> Self {
        self.totp_tolerance = steps;
        self
    }

    pub fn with_state_hold(mut self, hold: Duration) -> Self {
        self.state_hold = hold;
        self
    }

    pub fn mode(&self) -> SecurityMode {
        self.security.mode()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Security::None { pin } = &self.security {
            let valid = !pin.is_empty()
                && pin.len() <= INPUT_MAX_LEN
                && pin.bytes().all(|b| b.is_ascii_digit());
            if !valid {
                return Err(ConfigError::InvalidPin);
            }
        }
        if self.lookahead > MAX_LOOKAHEAD {
            return Err(ConfigError::LookaheadTooLarge(self.lookahead));
        }
        if self.totp_tolerance > MAX_TOTP_TOLERANCE {
            return Err(ConfigError::ToleranceTooLarge(self.totp_tolerance));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_modes_require_a_secret() {
        assert_eq!(
            Security::from_parts(SecurityMode::Hotp, None, None).unwrap_err(),
            ConfigError::MissingSecret(SecurityMode::Hotp)
        );
        assert_eq!(
            Security::from_parts(SecurityMode::Totp, None, Some("")).unwrap_err(),
            ConfigError::MissingSecret(SecurityMode::Totp)
        );
        assert_eq!(
            Security::from_parts(SecurityMode::None, None, Some("secret")).unwrap_err(),
            ConfigError::MissingPin
        );
    }

    #[test]
    fn from_parts_picks_mode() {
        let security = Security::from_parts(SecurityMode::Totp, None, Some("hunter2")).unwrap();
        assert_eq!(security.mode(), SecurityMode::Totp);
        let security = Security::from_parts(SecurityMode::None, Some("1234"), None).unwrap();
        assert_eq!(security.mode(), SecurityMode::None);
    }

    #[test]
    fn defaults() {
        let config = PinpadConfig::pin("1234");
        assert_eq!(config.lookahead, DEFAULT_LOOKAHEAD);
        assert_eq!(config.period.get(), 30);
        assert_eq!(config.totp_tolerance, 1);
        assert_eq!(config.state_hold, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pin_must_be_digits() {
        assert_eq!(PinpadConfig::pin("").validate(), Err(ConfigError::InvalidPin));
        assert_eq!(PinpadConfig::pin("12a4").validate(), Err(ConfigError::InvalidPin));
        assert_eq!(
            PinpadConfig::pin("1".repeat(INPUT_MAX_LEN + 1)).validate(),
            Err(ConfigError::InvalidPin)
        );
    }

    #[test]
    fn bounds_are_enforced() {
        let secret = SharedSecret::from_password("hunter2").unwrap();
        let config = PinpadConfig::hotp(secret.clone()).with_lookahead(MAX_LOOKAHEAD + 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::LookaheadTooLarge(MAX_LOOKAHEAD + 1))
        );
        let config = PinpadConfig::totp(secret).with_totp_tolerance(11);
        assert_eq!(config.validate(), Err(ConfigError::ToleranceTooLarge(11)));
    }
}
