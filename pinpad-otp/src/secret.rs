//! Shared secret handling

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use crate::OtpError;

/// SHA-1 block size; HMAC keys are hashed or zero-padded to this length
const BLOCK_LEN: usize = 64;

/// HMAC key shared between the pinpad and its operator.
///
/// Both the key and its HMAC key block are wiped on drop. No keyed HMAC state
/// outlives a single [`sign`](Self::sign) call.
#[derive(Clone)]
pub struct SharedSecret {
    key: Zeroizing<Vec<u8>>,
    block: Zeroizing<[u8; BLOCK_LEN]>,
}

impl SharedSecret {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, OtpError> {
        let key = Zeroizing::new(bytes.into());
        if key.is_empty() {
            return Err(OtpError::EmptySecret);
        }
        let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
        if key.len() > BLOCK_LEN {
            let digest = Sha1::digest(key.as_slice());
            block[..digest.len()].copy_from_slice(&digest);
        } else {
            block[..key.len()].copy_from_slice(&key);
        }
        Ok(Self { key, block })
    }

    /// Secret derived from an operator password.
    ///
    /// The password bytes are the key. Authenticator apps see the same key as
    /// `to_base32()`.
    pub fn from_password(password: &str) -> Result<Self, OtpError> {
        Self::from_bytes(password.as_bytes())
    }

    /// Secret from a base32 string (case, whitespace and padding ignored)
    pub fn from_base32(encoded: &str) -> Result<Self, OtpError> {
        let normalized: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let bytes = data_encoding::BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map_err(|e| OtpError::InvalidBase32(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn to_base32(&self) -> String {
        data_encoding::BASE32_NOPAD.encode(&self.key)
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 20] {
        let key = Key::<Hmac<Sha1>>::from_slice(&self.block[..]);
        let mut mac = <Hmac<Sha1> as KeyInit>::new(key);
        mac.update(message);
        let mut digest = [0u8; 20];
        digest.copy_from_slice(&mac.finalize().into_bytes());
        digest
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret(<{} bytes>)", self.key.len())
    }
}
