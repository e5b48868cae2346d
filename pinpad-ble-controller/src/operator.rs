//! The human side of a session

use std::io;

use zeroize::Zeroizing;

use crate::session::Candidate;

/// Interactive decisions the session needs from whoever runs it.
///
/// Prompts block until answered. The CLI implements this on the terminal;
/// tests script the answers.
pub trait Operator {
    /// Should the session use this device?
    fn confirm_device(&mut self, candidate: &Candidate) -> io::Result<bool>;

    /// Password for HOTP/TOTP when none was supplied up front
    fn ask_secret(&mut self) -> io::Result<Zeroizing<String>>;

    /// Literal PIN for devices in `none` mode
    fn ask_pin(&mut self) -> io::Result<Zeroizing<String>>;
}

impl<O: Operator + ?Sized> Operator for &mut O {
    fn confirm_device(&mut self, candidate: &Candidate) -> io::Result<bool> {
        (**self).confirm_device(candidate)
    }

    fn ask_secret(&mut self) -> io::Result<Zeroizing<String>> {
        (**self).ask_secret()
    }

    fn ask_pin(&mut self) -> io::Result<Zeroizing<String>> {
        (**self).ask_pin()
    }
}
