//! Client session: discover, select, connect, compute, submit.
//!
//! The flow is transport agnostic. [`Scanner`] and [`PinpadLink`] are
//! implemented over btleplug in [`crate::ble`] and in memory by the tests.

use std::num::NonZeroU64;
use std::time::Duration;

use pinpad_otp::{compute_hotp, compute_totp, Clock, Digits, SharedSecret, DEFAULT_PERIOD};
use pinpad_proto::ble::{
    command, counter, COMMAND_UUID, HOTP_COUNTER_UUID, RESPONSE_UUID, SECURITY_MODE_UUID,
};
use pinpad_proto::{Response, SecurityMode};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::SessionError;
use crate::operator::Operator;

/// Default scan duration
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// A peripheral advertising the pinpad service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
}

impl Candidate {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Finds pinpad peripherals and opens connections to them
#[allow(async_fn_in_trait)]
pub trait Scanner {
    type Link: PinpadLink;

    /// Scan for `timeout` and return devices advertising the pinpad
    /// service, in discovery order.
    async fn scan(&mut self, timeout: Duration) -> Result<Vec<Candidate>, SessionError>;

    /// Connect and discover the pinpad characteristics
    async fn connect(&mut self, candidate: &Candidate) -> Result<Self::Link, SessionError>;
}

/// An open connection to one pinpad
#[allow(async_fn_in_trait)]
pub trait PinpadLink {
    async fn read(&mut self, characteristic: u128) -> Result<Vec<u8>, SessionError>;

    /// Write with response
    async fn write(&mut self, characteristic: u128, data: &[u8]) -> Result<(), SessionError>;

    async fn disconnect(&mut self) -> Result<(), SessionError>;
}

#[derive(Clone)]
pub struct SessionOptions {
    /// Only talk to this device (case-insensitive), without asking
    pub device_address: Option<String>,
    pub timeout: Duration,
    /// HOTP/TOTP password; prompted for when absent
    pub password: Option<Zeroizing<String>>,
    /// Read the Response characteristic after writing
    pub check_response: bool,
    /// Wait before reading the response, giving the device time to evaluate
    pub response_delay: Duration,
    pub digits: Digits,
    pub period: NonZeroU64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device_address: None,
            timeout: DEFAULT_SCAN_TIMEOUT,
            password: None,
            check_response: false,
            response_delay: Duration::from_millis(200),
            digits: Digits::default(),
            period: DEFAULT_PERIOD,
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("device_address", &self.device_address)
            .field("timeout", &self.timeout)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("check_response", &self.check_response)
            .field("response_delay", &self.response_delay)
            .field("digits", &self.digits)
            .field("period", &self.period)
            .finish()
    }
}

/// Outcome of a completed submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub device: Candidate,
    pub mode: SecurityMode,
    /// Device counter the HOTP code was computed for
    pub counter: Option<u64>,
    /// Only present when the response was requested
    pub response: Option<Response>,
}

/// Scan and return every pinpad found, without connecting
pub async fn list<S: Scanner>(
    scanner: &mut S,
    timeout: Duration,
) -> Result<Vec<Candidate>, SessionError> {
    info!("Scanning for pinpads ({:?})", timeout);
    scanner.scan(timeout).await
}

/// Pick the device to talk to.
///
/// With an address, the matching candidate is used as is. Otherwise each
/// candidate is offered to the operator in order and the first confirmed
/// one wins.
pub fn select<O: Operator>(
    candidates: Vec<Candidate>,
    device_address: Option<&str>,
    operator: &mut O,
) -> Result<Candidate, SessionError> {
    if candidates.is_empty() {
        return Err(SessionError::NoDeviceFound);
    }

    if let Some(address) = device_address {
        return candidates
            .into_iter()
            .find(|c| c.address.eq_ignore_ascii_case(address))
            .ok_or(SessionError::NoDeviceFound);
    }

    for candidate in candidates {
        if operator.confirm_device(&candidate)? {
            return Ok(candidate);
        }
        debug!("Skipped {}", candidate.address);
    }
    Err(SessionError::NoDeviceSelected)
}

/// Run one complete attempt against a single pinpad.
///
/// The attempt is done once the device acknowledges the command write.
pub async fn run<S, O, C>(
    scanner: &mut S,
    operator: &mut O,
    options: &SessionOptions,
    clock: &C,
) -> Result<Submission, SessionError>
where
    S: Scanner,
    O: Operator,
    C: Clock,
{
    let candidates = list(scanner, options.timeout).await?;
    debug!("Found {} pinpad(s)", candidates.len());
    let device = select(candidates, options.device_address.as_deref(), operator)?;

    info!("Connecting to {} ({})", device.display_name(), device.address);
    let mut link = scanner.connect(&device).await?;

    let result = submit(&mut link, operator, options, clock).await;
    if let Err(e) = link.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }

    let (mode, counter, response) = result?;
    Ok(Submission { device, mode, counter, response })
}

async fn submit<L, O, C>(
    link: &mut L,
    operator: &mut O,
    options: &SessionOptions,
    clock: &C,
) -> Result<(SecurityMode, Option<u64>, Option<Response>), SessionError>
where
    L: PinpadLink,
    O: Operator,
    C: Clock,
{
    let mode = SecurityMode::from_bytes(&link.read(SECURITY_MODE_UUID).await?)?;
    info!("Security mode: {}", mode);

    let (code, counter) = match mode {
        SecurityMode::None => {
            let pin = operator.ask_pin()?;
            if pin.is_empty() {
                return Err(SessionError::EmptyPin);
            }
            (pin, None)
        }
        SecurityMode::Hotp => {
            let value = counter::decode(&link.read(HOTP_COUNTER_UUID).await?)?;
            debug!("Device counter: {}", value);
            let secret = obtain_secret(mode, options, operator)?;
            let code = compute_hotp(&secret, value, options.digits);
            (Zeroizing::new(code.as_str().to_owned()), Some(value))
        }
        SecurityMode::Totp => {
            let secret = obtain_secret(mode, options, operator)?;
            let code = compute_totp(&secret, clock.unix_time(), options.period, options.digits);
            (Zeroizing::new(code.as_str().to_owned()), None)
        }
    };

    link.write(COMMAND_UUID, &command::encode(&code)).await?;
    info!("Code submitted");

    let response = if options.check_response {
        tokio::time::sleep(options.response_delay).await;
        read_response(link).await?
    } else {
        None
    };

    Ok((mode, counter, response))
}

fn obtain_secret<O: Operator>(
    mode: SecurityMode,
    options: &SessionOptions,
    operator: &mut O,
) -> Result<SharedSecret, SessionError> {
    let password = match &options.password {
        Some(password) => password.clone(),
        None => operator.ask_secret()?,
    };
    if password.is_empty() {
        return Err(SessionError::MissingSecret(mode));
    }
    Ok(SharedSecret::from_password(&password)?)
}

async fn read_response<L: PinpadLink>(link: &mut L) -> Result<Option<Response>, SessionError> {
    let data = link.read(RESPONSE_UUID).await?;
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(Response::from_bytes(&data)?))
}
