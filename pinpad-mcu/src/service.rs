//! Pinpad service state machine
//!
//! A command write is evaluated start to finish (counter advance, indicator,
//! triggers, response) inside a single critical section. A write that arrives
//! while another is being evaluated gets [`Response::Busy`] instead of
//! waiting, so two submissions never race on the HOTP counter.
//!
//! A dropped write leaves `busy` on the Response characteristic once the
//! running evaluation ends; that evaluation's verdict stays visible through
//! [`PinpadService::last_outcome`] and the Status characteristic.
//!
//! Characteristic reads (mode, counter, status, response) go through atomics
//! and are never blocked by an evaluation. While stopped, commands are
//! refused without side effects.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use pinpad_otp::{Clock, SystemClock};
use pinpad_proto::ble::command;
use pinpad_proto::{Response, SecurityMode, Status};

use crate::config::{ConfigError, PinpadConfig};
use crate::counter::{CounterError, CounterStore};
use crate::indicator::{Level, StatusIndicator, Trigger, TriggerKind, Triggers};
use crate::policy::{SecurityPolicy, VerificationResult};
use crate::storage::CounterStorage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinpadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Counter(#[from] CounterError),
}

const NO_RESPONSE: u8 = 0;

fn response_code(response: Response) -> u8 {
    match response {
        Response::Accepted => 1,
        Response::Rejected => 2,
        Response::Busy => 3,
    }
}

fn response_from_code(code: u8) -> Option<Response> {
    match code {
        1 => Some(Response::Accepted),
        2 => Some(Response::Rejected),
        3 => Some(Response::Busy),
        _ => None,
    }
}

/// Everything only touched while evaluating
struct Dispatch {
    indicator: Option<Box<dyn StatusIndicator>>,
    triggers: Triggers,
    decided_at: Option<Instant>,
}

impl Dispatch {
    fn set_indicator(&mut self, level: Level) {
        if let Some(indicator) = self.indicator.as_mut() {
            if let Err(e) = indicator.set_level(level) {
                warn!("{}", e);
            }
        }
    }
}

/// Clears the evaluating flag however evaluation ends
struct Evaluating<'a>(&'a AtomicBool);

impl<'a> Evaluating<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Evaluating<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PinpadService<S, C = SystemClock> {
    policy: SecurityPolicy,
    counter: CounterStore<S>,
    clock: C,
    state_hold: Duration,
    dispatch: Mutex<Dispatch>,
    evaluating: AtomicBool,
    pending: Mutex<Option<Vec<u8>>>,
    status: AtomicU8,
    response: AtomicU8,
    outcome: AtomicU8,
    evaluations: AtomicU64,
    busy_drops: AtomicU64,
}

pub struct PinpadServiceBuilder<S, C> {
    config: PinpadConfig,
    storage: S,
    clock: C,
    indicator: Option<Box<dyn StatusIndicator>>,
    triggers: Triggers,
}

impl<S: CounterStorage> PinpadService<S, SystemClock> {
    pub fn builder(config: PinpadConfig, storage: S) -> PinpadServiceBuilder<S, SystemClock> {
        PinpadServiceBuilder {
            config,
            storage,
            clock: SystemClock,
            indicator: None,
            triggers: Triggers::default(),
        }
    }
}

impl<S: CounterStorage, C: Clock> PinpadServiceBuilder<S, C> {
    pub fn clock<C2: Clock>(self, clock: C2) -> PinpadServiceBuilder<S, C2> {
        PinpadServiceBuilder {
            config: self.config,
            storage: self.storage,
            clock,
            indicator: self.indicator,
            triggers: self.triggers,
        }
    }

    pub fn status_indicator(mut self, indicator: impl StatusIndicator + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }

    pub fn on_accepted(mut self, trigger: impl Trigger + 'static) -> Self {
        self.triggers.register(TriggerKind::Accepted, trigger);
        self
    }

    pub fn on_rejected(mut self, trigger: impl Trigger + 'static) -> Self {
        self.triggers.register(TriggerKind::Rejected, trigger);
        self
    }

    pub fn build(self) -> Result<PinpadService<S, C>, PinpadError> {
        self.config.validate()?;
        let counter = CounterStore::open(self.storage)?;

        info!("BLE Pinpad:");
        info!("  Security mode: {}", self.config.mode());
        info!("  Status indicator: {}", if self.indicator.is_some() { "yes" } else { "no" });
        info!(
            "  Triggers: {} accepted, {} rejected",
            self.triggers.count(TriggerKind::Accepted),
            self.triggers.count(TriggerKind::Rejected)
        );
        if self.config.mode() == SecurityMode::Hotp {
            info!("  HOTP counter: {} (lookahead {})", counter.read(), self.config.lookahead);
        }

        Ok(PinpadService {
            policy: SecurityPolicy::new(&self.config),
            counter,
            clock: self.clock,
            state_hold: self.config.state_hold,
            dispatch: Mutex::new(Dispatch {
                indicator: self.indicator,
                triggers: self.triggers,
                decided_at: None,
            }),
            evaluating: AtomicBool::new(false),
            pending: Mutex::new(None),
            status: AtomicU8::new(Status::Stopped.as_byte()),
            response: AtomicU8::new(NO_RESPONSE),
            outcome: AtomicU8::new(NO_RESPONSE),
            evaluations: AtomicU64::new(0),
            busy_drops: AtomicU64::new(0),
        })
    }
}

impl<S: CounterStorage, C: Clock> PinpadService<S, C> {
    pub fn on_mode_read(&self) -> SecurityMode {
        self.policy.describe_mode()
    }

    pub fn on_counter_read(&self) -> u64 {
        self.counter.read()
    }

    pub fn status(&self) -> Status {
        Status::from_byte(self.status.load(Ordering::SeqCst)).unwrap_or(Status::Stopped)
    }

    /// Current value of the Response characteristic
    pub fn last_response(&self) -> Option<Response> {
        response_from_code(self.response.load(Ordering::SeqCst))
    }

    /// Verdict of the most recent evaluation, even when a dropped write has
    /// since put `busy` on the Response characteristic
    pub fn last_outcome(&self) -> Option<Response> {
        response_from_code(self.outcome.load(Ordering::SeqCst))
    }

    /// Number of finished evaluations
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Number of writes dropped as busy
    pub fn busy_drops(&self) -> u64 {
        self.busy_drops.load(Ordering::SeqCst)
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        if self.status() != Status::Stopped {
            return;
        }
        self.lock_dispatch().set_indicator(Level::Off);
        self.set_status(Status::Idle);
        info!("Pinpad service started");
    }

    pub fn stop(&self) {
        let mut dispatch = self.lock_dispatch();
        dispatch.set_indicator(Level::Off);
        dispatch.decided_at = None;
        self.take_pending();
        self.set_status(Status::Stopped);
        info!("Pinpad service stopped");
    }

    pub fn on_client_disconnect(&self) {
        if self.take_pending().is_some() {
            debug!("Dropped pending command on disconnect");
        }
        if self.status() == Status::Stopped {
            return;
        }
        let mut dispatch = self.lock_dispatch();
        dispatch.set_indicator(Level::Off);
        dispatch.decided_at = None;
        self.set_status(Status::Idle);
    }

    /// GATT write callback: stash the command for [`poll`](Self::poll).
    ///
    /// Returns `Some(Response::Busy)` when an evaluation is running and
    /// `Some(Response::Rejected)` while stopped; the write is then dropped.
    /// Otherwise any earlier unprocessed write is replaced.
    pub fn on_write(&self, data: &[u8]) -> Option<Response> {
        if self.status() == Status::Stopped {
            debug!("Command write while stopped, ignoring");
            return Some(Response::Rejected);
        }
        if self.is_evaluating() {
            debug!("Command write while evaluating, answering busy");
            self.drop_busy();
            return Some(Response::Busy);
        }
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.to_vec());
        None
    }

    /// Evaluate the pending command, if any. Called from the main loop.
    pub fn poll(&self) -> Option<Result<Response, PinpadError>> {
        let data = self.take_pending()?;
        Some(self.on_command_written(&data))
    }

    /// Verify a written command and run the accept/reject side effects.
    ///
    /// Wrong or malformed codes are `Ok(Response::Rejected)`. `Err` means
    /// the HOTP counter could not be advanced; the attempt is then answered
    /// as rejected and no accepted triggers fire.
    ///
    /// A stopped service answers `Ok(Response::Rejected)` and changes
    /// nothing: no triggers, no counter advance, no status change.
    pub fn on_command_written(&self, data: &[u8]) -> Result<Response, PinpadError> {
        if self.status() == Status::Stopped {
            debug!("Command while stopped, ignoring");
            return Ok(Response::Rejected);
        }
        let mut dispatch = match self.dispatch.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("Command arrived mid-evaluation, answering busy");
                self.drop_busy();
                return Ok(Response::Busy);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        // stop() waits on the dispatch lock, so the status cannot change under us
        if self.status() == Status::Stopped {
            return Ok(Response::Rejected);
        }
        let _evaluating = Evaluating::enter(&self.evaluating);
        let drops_before = self.busy_drops();

        let result = match command::normalize(data) {
            Some(submitted) => {
                self.policy
                    .verify(submitted, self.counter.read(), self.clock.unix_time())
            }
            None => {
                debug!("Command too long ({} bytes), rejecting", data.len());
                VerificationResult::Rejected
            }
        };

        match result {
            VerificationResult::Accepted { matched_counter } => {
                if let Some(matched) = matched_counter {
                    if let Err(e) = self.counter.advance_to(matched) {
                        error!("HOTP counter not advanced, refusing accept: {}", e);
                        self.decide(&mut dispatch, Status::Rejected, Level::Off, None);
                        self.finish(Response::Rejected, drops_before);
                        return Err(e.into());
                    }
                }
                info!("Pin accepted");
                let fire = Some(TriggerKind::Accepted);
                self.decide(&mut dispatch, Status::Accepted, Level::On, fire);
                self.finish(Response::Accepted, drops_before);
                Ok(Response::Accepted)
            }
            VerificationResult::Rejected => {
                info!("Pin rejected");
                let fire = Some(TriggerKind::Rejected);
                self.decide(&mut dispatch, Status::Rejected, Level::Off, fire);
                self.finish(Response::Rejected, drops_before);
                Ok(Response::Rejected)
            }
        }
    }

    /// Return to idle once an accepted/rejected status has been held long
    /// enough. Skipped while an evaluation is running.
    pub fn tick(&self, now: Instant) {
        let mut dispatch = match self.dispatch.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let Some(decided_at) = dispatch.decided_at else {
            return;
        };
        if now.saturating_duration_since(decided_at) < self.state_hold {
            return;
        }
        dispatch.decided_at = None;
        dispatch.set_indicator(Level::Off);
        if matches!(self.status(), Status::Accepted | Status::Rejected) {
            self.set_status(Status::Idle);
        }
    }

    fn decide(
        &self,
        dispatch: &mut Dispatch,
        status: Status,
        level: Level,
        fire: Option<TriggerKind>,
    ) {
        self.set_status(status);
        dispatch.decided_at = Some(Instant::now());
        dispatch.set_indicator(level);
        if let Some(kind) = fire {
            let failures = dispatch.triggers.fire(kind);
            if failures > 0 {
                warn!("{} {:?} trigger(s) failed", failures, kind);
            }
        }
    }

    fn set_status(&self, status: Status) {
        self.status.store(status.as_byte(), Ordering::SeqCst);
    }

    fn set_response(&self, response: Response) {
        self.response.store(response_code(response), Ordering::SeqCst);
    }

    fn drop_busy(&self) {
        self.busy_drops.fetch_add(1, Ordering::SeqCst);
        self.set_response(Response::Busy);
    }

    /// Publish a verdict. If a write was dropped while it was being reached,
    /// the Response characteristic keeps `busy` so the dropped writer never
    /// reads someone else's verdict.
    fn finish(&self, outcome: Response, drops_before: u64) {
        self.outcome.store(response_code(outcome), Ordering::SeqCst);
        self.set_response(outcome);
        if self.busy_drops() != drops_before {
            self.set_response(Response::Busy);
        }
        self.evaluations.fetch_add(1, Ordering::SeqCst);
    }

    fn take_pending(&self) -> Option<Vec<u8>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
