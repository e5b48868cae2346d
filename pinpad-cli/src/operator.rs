//! Terminal prompts for the client session

use std::io::{self, BufRead, Write};

use pinpad_ble_controller::{Candidate, Operator};
use zeroize::Zeroizing;

/// Asks on stdout, reads answers line by line
pub struct TerminalOperator<R> {
    input: R,
}

impl TerminalOperator<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self { input: io::stdin().lock() }
    }
}

impl<R: BufRead> TerminalOperator<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    fn prompt(&mut self, question: &str) -> io::Result<Zeroizing<String>> {
        print!("{}", question);
        io::stdout().flush()?;

        let mut line = Zeroizing::new(String::new());
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

impl<R: BufRead> Operator for TerminalOperator<R> {
    fn confirm_device(&mut self, candidate: &Candidate) -> io::Result<bool> {
        let rssi = candidate.rssi.map(|r| format!(" ({}dBm)", r)).unwrap_or_default();
        let answer = self.prompt(&format!(
            "Use {} - {}{}? [y/N] ",
            candidate.display_name(),
            candidate.address,
            rssi
        ))?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn ask_secret(&mut self) -> io::Result<Zeroizing<String>> {
        self.prompt("Password: ")
    }

    fn ask_pin(&mut self) -> io::Result<Zeroizing<String>> {
        let pin = self.prompt("PIN: ")?;
        Ok(Zeroizing::new(pin.trim().to_owned()))
    }
}
