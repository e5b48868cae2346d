//! Build-time device configuration
//!
//! Provision a device by editing these values and reflashing.

use std::time::Duration;

use pinpad_mcu::{Digits, PinpadConfig, Security, SecurityMode};

/// Name shown in BLE scans
pub const DEVICE_NAME: &str = "Pinpad";

/// `none`, `hotp` or `totp`
pub const SECURITY_MODE: &str = "hotp";

/// PIN for `none` mode
pub const PIN: &str = "1234";

/// Shared password for `hotp` and `totp` modes
pub const PASSWORD: &str = "change-me";

pub const LOOKAHEAD: u64 = 5;

/// Steps either side of now accepted in `totp` mode
pub const TOTP_TOLERANCE: u64 = 1;

/// How long accepted/rejected stays on the status characteristic and LED
pub const STATE_HOLD: Duration = Duration::from_millis(500);

/// How long the door relay is energised after an accepted code
pub const RELAY_PULSE: Duration = Duration::from_millis(200);

/// Wi-Fi is only used to get the time for `totp` mode
pub const WIFI_SSID: &str = "";
pub const WIFI_PASS: &str = "";

pub fn pinpad_config() -> anyhow::Result<PinpadConfig> {
    let mode = SecurityMode::from_bytes(SECURITY_MODE.as_bytes())?;
    let security = Security::from_parts(mode, Some(PIN), Some(PASSWORD))?;

    let config = PinpadConfig::new(security)
        .with_digits(Digits::SIX)
        .with_lookahead(LOOKAHEAD)
        .with_totp_tolerance(TOTP_TOLERANCE)
        .with_state_hold(STATE_HOLD);
    config.validate()?;
    Ok(config)
}
