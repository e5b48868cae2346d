//! BLE GATT Service Protocol Constants for the Pinpad
//!
//! This module defines the service/characteristic UUIDs and the value
//! encodings of every characteristic the pinpad exposes.

/// BLE Service UUID: 0003cc02-25ce-4e26-a32f-8c1bfa900000
pub const SERVICE_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900000;

/// Status Characteristic UUID (read/notify)
pub const STATUS_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900001;

/// Command Characteristic UUID (write with response)
pub const COMMAND_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900002;

/// Response Characteristic UUID (read/notify)
pub const RESPONSE_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900003;

/// Security Mode Characteristic UUID (read)
pub const SECURITY_MODE_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900004;

/// HOTP Counter Characteristic UUID (read)
pub const HOTP_COUNTER_UUID: u128 = 0x0003cc02_25ce_4e26_a32f_8c1bfa900005;

/// Longest command the peripheral will evaluate
pub const INPUT_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("unknown security mode: {0:?}")]
    UnknownMode(String),
    #[error("invalid counter value: {0:?}")]
    InvalidCounter(String),
    #[error("unknown response marker: {0:?}")]
    UnknownResponse(String),
    #[error("unknown status byte: 0x{0:02x}")]
    UnknownStatus(u8),
}

/// Security mode advertised on the SecurityMode characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Static PIN compared byte for byte
    None,
    /// Counter based one-time code
    Hotp,
    /// Time based one-time code
    Totp,
}

impl SecurityMode {
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::None => "none",
            SecurityMode::Hotp => "hotp",
            SecurityMode::Totp => "totp",
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        match data {
            b"none" => Ok(SecurityMode::None),
            b"hotp" => Ok(SecurityMode::Hotp),
            b"totp" => Ok(SecurityMode::Totp),
            other => Err(ProtoError::UnknownMode(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pinpad status for the Status characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Service not running
    Stopped = 0x00,
    /// Waiting for a command
    Idle = 0x01,
    /// Last command was accepted
    Accepted = 0x02,
    /// Last command was rejected
    Rejected = 0x03,
}

impl Status {
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtoError> {
        match byte {
            0x00 => Ok(Status::Stopped),
            0x01 => Ok(Status::Idle),
            0x02 => Ok(Status::Accepted),
            0x03 => Ok(Status::Rejected),
            other => Err(ProtoError::UnknownStatus(other)),
        }
    }
}

/// Outcome marker written to the Response characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Accepted,
    Rejected,
    /// A command arrived while another was being evaluated
    Busy,
}

impl Response {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Response::Accepted => b"accepted",
            Response::Rejected => b"rejected",
            Response::Busy => b"busy",
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        match data {
            b"accepted" => Ok(Response::Accepted),
            b"rejected" => Ok(Response::Rejected),
            b"busy" => Ok(Response::Busy),
            other => Err(ProtoError::UnknownResponse(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// HOTP counter characteristic encoding (ASCII decimal)
pub mod counter {
    use super::ProtoError;

    pub fn encode(value: u64) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<u64, ProtoError> {
        let invalid = || ProtoError::InvalidCounter(String::from_utf8_lossy(data).into_owned());
        if data.is_empty() || !data.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        std::str::from_utf8(data)
            .map_err(|_| invalid())?
            .parse()
            .map_err(|_| invalid())
    }
}

/// Command characteristic framing
pub mod command {
    use super::INPUT_MAX_LEN;

    /// Strip a single trailing `\0` or `\n` terminator.
    ///
    /// Returns `None` for writes longer than [`INPUT_MAX_LEN`].
    pub fn normalize(data: &[u8]) -> Option<&[u8]> {
        if data.len() > INPUT_MAX_LEN {
            return None;
        }
        match data.last() {
            Some(b'\0') | Some(b'\n') => Some(&data[..data.len() - 1]),
            _ => Some(data),
        }
    }

    /// Encode a code for the Command characteristic
    pub fn encode(code: &str) -> Vec<u8> {
        code.as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_mode_is_plain_ascii() {
        assert_eq!(SecurityMode::Hotp.as_bytes(), b"hotp");
        assert_eq!(SecurityMode::from_bytes(b"totp"), Ok(SecurityMode::Totp));
        assert_eq!(SecurityMode::from_bytes(b"none"), Ok(SecurityMode::None));
        assert!(matches!(
            SecurityMode::from_bytes(b"HOTP"),
            Err(ProtoError::UnknownMode(_))
        ));
    }

    #[test]
    fn status_bytes() {
        assert_eq!(Status::Idle.as_byte(), 1);
        assert_eq!(Status::from_byte(3), Ok(Status::Rejected));
        assert_eq!(Status::from_byte(9), Err(ProtoError::UnknownStatus(9)));
    }

    #[test]
    fn counter_rejects_non_digits() {
        assert_eq!(counter::decode(b"42"), Ok(42));
        assert_eq!(counter::encode(18_446_744_073_709_551_615), b"18446744073709551615");
        assert!(counter::decode(b"").is_err());
        assert!(counter::decode(b"-1").is_err());
        assert!(counter::decode(b"+7").is_err());
        assert!(counter::decode(b"18446744073709551616").is_err());
    }

    #[test]
    fn command_terminators_and_limit() {
        assert_eq!(command::normalize(b"1234\n"), Some(&b"1234"[..]));
        assert_eq!(command::normalize(b"1234\0"), Some(&b"1234"[..]));
        assert_eq!(command::normalize(b"1234\n\n"), Some(&b"1234\n"[..]));
        assert_eq!(command::normalize(b""), Some(&b""[..]));
        assert_eq!(command::normalize(&[b'1'; INPUT_MAX_LEN + 1]), None);
    }
}
