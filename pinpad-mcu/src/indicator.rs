//! Outputs driven by the pinpad: an optional status indicator and the
//! accepted/rejected automation triggers.

use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status indicator: {0}")]
pub struct IndicatorError(pub String);

/// Binary output (LED, relay) showing the pinpad state. Write-only.
pub trait StatusIndicator: Send {
    fn set_level(&mut self, level: Level) -> Result<(), IndicatorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("trigger failed: {0}")]
pub struct TriggerError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Accepted,
    Rejected,
}

/// An automation fired after a verification outcome
pub trait Trigger: Send {
    fn fire(&mut self) -> Result<(), TriggerError>;
}

impl<F> Trigger for F
where
    F: FnMut() -> Result<(), TriggerError> + Send,
{
    fn fire(&mut self) -> Result<(), TriggerError> {
        self()
    }
}

/// Registered triggers, kept per kind in registration order
#[derive(Default)]
pub struct Triggers {
    accepted: Vec<Box<dyn Trigger>>,
    rejected: Vec<Box<dyn Trigger>>,
}

impl Triggers {
    pub fn register(&mut self, kind: TriggerKind, trigger: impl Trigger + 'static) {
        self.list_mut(kind).push(Box::new(trigger));
    }

    pub fn count(&self, kind: TriggerKind) -> usize {
        match kind {
            TriggerKind::Accepted => self.accepted.len(),
            TriggerKind::Rejected => self.rejected.len(),
        }
    }

    /// Fire every trigger of `kind`. A failing trigger does not stop the
    /// rest; the number of failures is returned.
    pub fn fire(&mut self, kind: TriggerKind) -> usize {
        let mut failures = 0;
        for (index, trigger) in self.list_mut(kind).iter_mut().enumerate() {
            if let Err(e) = trigger.fire() {
                warn!("{:?} trigger #{} failed: {}", kind, index, e);
                failures += 1;
            }
        }
        failures
    }

    fn list_mut(&mut self, kind: TriggerKind) -> &mut Vec<Box<dyn Trigger>> {
        match kind {
            TriggerKind::Accepted => &mut self.accepted,
            TriggerKind::Rejected => &mut self.rejected,
        }
    }
}
