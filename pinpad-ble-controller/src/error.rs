use pinpad_otp::OtpError;
use pinpad_proto::ProtoError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bluetooth: {0}")]
    Transport(#[from] btleplug::Error),
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no pinpad device found")]
    NoDeviceFound,
    #[error("no pinpad device selected")]
    NoDeviceSelected,
    #[error("device {0} is no longer available")]
    DeviceGone(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(String),
    #[error("unexpected data from device: {0}")]
    Protocol(#[from] ProtoError),
    #[error("a password is required for {0} mode")]
    MissingSecret(pinpad_proto::SecurityMode),
    #[error("empty PIN")]
    EmptyPin,
    #[error("invalid secret: {0}")]
    Otp(#[from] OtpError),
    #[error("operator input failed: {0}")]
    Operator(#[from] std::io::Error),
}
