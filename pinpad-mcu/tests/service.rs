//! Service-level scenarios: replay protection, lookahead, skew tolerance,
//! side effects and serialization of concurrent submissions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use pinpad_mcu::{
    CounterError, CounterStorage, IndicatorError, Level, ManualClock, MemoryStorage, PinpadConfig,
    PinpadError, PinpadService, Response, SecurityMode, SharedSecret, Status, StatusIndicator,
    TriggerError,
};
use pinpad_otp::{compute_hotp, compute_totp, Digits, DEFAULT_PERIOD};

// ── Doubles ───────────────────────────────────────────────────

/// Indicator that records every level it was driven to
#[derive(Clone, Default)]
struct RecordingIndicator(Arc<Mutex<Vec<Level>>>);

impl RecordingIndicator {
    fn last(&self) -> Option<Level> {
        self.0.lock().unwrap().last().copied()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn set_level(&mut self, level: Level) -> Result<(), IndicatorError> {
        self.0.lock().unwrap().push(level);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FireCount(Arc<AtomicUsize>);

impl FireCount {
    fn trigger(&self) -> impl FnMut() -> Result<(), TriggerError> + Send + 'static {
        let count = self.0.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Storage whose writes always fail, as a worn-out flash sector would
struct ReadOnlyStorage(u64);

impl CounterStorage for ReadOnlyStorage {
    type Error = &'static str;

    fn load_counter(&self) -> Result<Option<u64>, Self::Error> {
        Ok(Some(self.0))
    }

    fn save_counter(&mut self, _value: u64) -> Result<(), Self::Error> {
        Err("flash write failed")
    }
}

fn example_secret() -> SharedSecret {
    SharedSecret::from_base32("JBSWY3DPEHPK3PXP").unwrap()
}

fn hotp_code(counter: u64) -> Vec<u8> {
    compute_hotp(&example_secret(), counter, Digits::SIX).as_bytes().to_vec()
}

// ── HOTP ──────────────────────────────────────────────────────

#[test]
fn hotp_code_is_accepted_once() {
    let storage = MemoryStorage::with_counter(5);
    let accepted = FireCount::default();
    let rejected = FireCount::default();
    let service = PinpadService::builder(
        PinpadConfig::hotp(example_secret()).with_lookahead(2),
        storage.clone(),
    )
    .on_accepted(accepted.trigger())
    .on_rejected(rejected.trigger())
    .build()
    .unwrap();
    service.start();

    assert_eq!(service.on_mode_read(), SecurityMode::Hotp);
    assert_eq!(service.on_counter_read(), 5);

    assert_eq!(service.on_command_written(&hotp_code(6)), Ok(Response::Accepted));
    assert_eq!(service.on_counter_read(), 7);
    assert_eq!(storage.value(), Some(7));
    assert_eq!(accepted.get(), 1);

    assert_eq!(service.on_command_written(&hotp_code(6)), Ok(Response::Rejected));
    assert_eq!(service.on_counter_read(), 7);
    assert_eq!(accepted.get(), 1);
    assert_eq!(rejected.get(), 1);
}

#[test]
fn lookahead_bounds_tolerance() {
    let lookahead = 3;
    for k in 0..=lookahead + 1 {
        let service = PinpadService::builder(
            PinpadConfig::hotp(example_secret()).with_lookahead(lookahead),
            MemoryStorage::with_counter(10),
        )
        .build()
        .unwrap();
        service.start();

        let response = service.on_command_written(&hotp_code(10 + k)).unwrap();
        if k <= lookahead {
            assert_eq!(response, Response::Accepted, "k = {k}");
            assert_eq!(service.on_counter_read(), 10 + k + 1);
            assert_eq!(
                service.on_command_written(&hotp_code(10 + k)).unwrap(),
                Response::Rejected,
                "replay at k = {k}"
            );
        } else {
            assert_eq!(response, Response::Rejected, "k = {k}");
            assert_eq!(service.on_counter_read(), 10);
        }
    }
}

#[test]
fn codes_below_the_counter_never_verify() {
    let service = PinpadService::builder(
        PinpadConfig::hotp(example_secret()),
        MemoryStorage::with_counter(0),
    )
    .build()
    .unwrap();
    service.start();

    assert_eq!(service.on_command_written(&hotp_code(4)), Ok(Response::Accepted));
    for old in 0..=4 {
        assert_eq!(service.on_command_written(&hotp_code(old)), Ok(Response::Rejected));
    }
    assert_eq!(service.on_counter_read(), 5);
}

#[test]
fn counter_survives_restart() {
    let storage = MemoryStorage::new();
    {
        let service =
            PinpadService::builder(PinpadConfig::hotp(example_secret()), storage.clone())
                .build()
                .unwrap();
        service.start();
        service.on_command_written(&hotp_code(0)).unwrap();
    }

    let service = PinpadService::builder(PinpadConfig::hotp(example_secret()), storage)
        .build()
        .unwrap();
    service.start();
    assert_eq!(service.on_counter_read(), 1);
    assert_eq!(service.on_command_written(&hotp_code(0)), Ok(Response::Rejected));
}

#[test]
fn failed_counter_write_refuses_the_accept() {
    let accepted = FireCount::default();
    let indicator = RecordingIndicator::default();
    let service = PinpadService::builder(
        PinpadConfig::hotp(example_secret()),
        ReadOnlyStorage(2),
    )
    .status_indicator(indicator.clone())
    .on_accepted(accepted.trigger())
    .build()
    .unwrap();
    service.start();

    let result = service.on_command_written(&hotp_code(2));
    assert_eq!(
        result,
        Err(PinpadError::Counter(CounterError::Storage("flash write failed".into())))
    );
    assert_eq!(service.on_counter_read(), 2);
    assert_eq!(service.last_response(), Some(Response::Rejected));
    assert_eq!(service.status(), Status::Rejected);
    assert_eq!(indicator.last(), Some(Level::Off));
    assert_eq!(accepted.get(), 0);
}

// ── PIN ───────────────────────────────────────────────────────

#[test]
fn pin_scenario_drives_response_indicator_and_triggers() {
    let accepted = FireCount::default();
    let rejected = FireCount::default();
    let indicator = RecordingIndicator::default();
    let service = PinpadService::builder(PinpadConfig::pin("1234"), MemoryStorage::new())
        .status_indicator(indicator.clone())
        .on_accepted(accepted.trigger())
        .on_rejected(rejected.trigger())
        .build()
        .unwrap();
    service.start();
    assert_eq!(service.last_response(), None);

    assert_eq!(service.on_command_written(b"1234"), Ok(Response::Accepted));
    assert_eq!(service.last_response(), Some(Response::Accepted));
    assert_eq!(service.status(), Status::Accepted);
    assert_eq!(indicator.last(), Some(Level::On));
    assert_eq!((accepted.get(), rejected.get()), (1, 0));

    assert_eq!(service.on_command_written(b"1235"), Ok(Response::Rejected));
    assert_eq!(service.last_response(), Some(Response::Rejected));
    assert_eq!(service.status(), Status::Rejected);
    assert_eq!(indicator.last(), Some(Level::Off));
    assert_eq!((accepted.get(), rejected.get()), (1, 1));
}

#[test]
fn terminated_and_oversized_commands() {
    let service = PinpadService::builder(PinpadConfig::pin("1234"), MemoryStorage::new())
        .build()
        .unwrap();
    service.start();

    assert_eq!(service.on_command_written(b"1234\n"), Ok(Response::Accepted));
    assert_eq!(service.on_command_written(b"1234\0"), Ok(Response::Accepted));
    assert_eq!(service.on_command_written(b""), Ok(Response::Rejected));
    assert_eq!(service.on_command_written(&[b'1'; 300]), Ok(Response::Rejected));
}

// ── TOTP ──────────────────────────────────────────────────────

#[test]
fn totp_accepts_one_step_of_skew() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let service = PinpadService::builder(
        PinpadConfig::totp(example_secret()),
        MemoryStorage::new(),
    )
    .clock(clock.clone())
    .build()
    .unwrap();
    service.start();
    let code = compute_totp(&example_secret(), 1_700_000_000, DEFAULT_PERIOD, Digits::SIX);

    assert_eq!(service.on_mode_read(), SecurityMode::Totp);
    assert_eq!(service.on_command_written(code.as_bytes()), Ok(Response::Accepted));

    clock.advance(30);
    assert_eq!(service.on_command_written(code.as_bytes()), Ok(Response::Accepted));

    clock.advance(60);
    assert_eq!(service.on_command_written(code.as_bytes()), Ok(Response::Rejected));
}

// ── State machine ─────────────────────────────────────────────

#[test]
fn status_holds_then_returns_to_idle() {
    let indicator = RecordingIndicator::default();
    let service = PinpadService::builder(
        PinpadConfig::pin("1234").with_state_hold(Duration::from_millis(500)),
        MemoryStorage::new(),
    )
    .status_indicator(indicator.clone())
    .build()
    .unwrap();

    assert_eq!(service.status(), Status::Stopped);
    service.start();
    assert_eq!(service.status(), Status::Idle);

    service.on_command_written(b"1234").unwrap();
    service.tick(Instant::now());
    assert_eq!(service.status(), Status::Accepted);
    assert_eq!(indicator.last(), Some(Level::On));

    service.tick(Instant::now() + Duration::from_secs(1));
    assert_eq!(service.status(), Status::Idle);
    assert_eq!(indicator.last(), Some(Level::Off));

    service.stop();
    assert_eq!(service.status(), Status::Stopped);
}

#[test]
fn stopped_service_ignores_commands() {
    let accepted = FireCount::default();
    let rejected = FireCount::default();
    let indicator = RecordingIndicator::default();
    let storage = MemoryStorage::with_counter(0);
    let service = PinpadService::builder(PinpadConfig::hotp(example_secret()), storage.clone())
        .status_indicator(indicator.clone())
        .on_accepted(accepted.trigger())
        .on_rejected(rejected.trigger())
        .build()
        .unwrap();

    // never started
    assert_eq!(service.on_command_written(&hotp_code(0)), Ok(Response::Rejected));
    assert_eq!(service.status(), Status::Stopped);

    service.start();
    service.stop();
    let levels_after_stop = indicator.0.lock().unwrap().len();

    assert_eq!(service.on_command_written(&hotp_code(0)), Ok(Response::Rejected));
    assert_eq!(service.on_write(&hotp_code(0)), Some(Response::Rejected));
    assert!(service.poll().is_none());
    service.tick(Instant::now() + Duration::from_secs(10));

    assert_eq!(service.status(), Status::Stopped);
    assert_eq!((accepted.get(), rejected.get()), (0, 0));
    assert_eq!(service.on_counter_read(), 0);
    assert_eq!(storage.value(), Some(0));
    assert_eq!(service.last_response(), None);
    assert_eq!(indicator.0.lock().unwrap().len(), levels_after_stop);

    // restarting makes the same code usable
    service.start();
    assert_eq!(service.on_command_written(&hotp_code(0)), Ok(Response::Accepted));
}

#[test]
fn write_then_poll_evaluates_latest_command() {
    let service = PinpadService::builder(PinpadConfig::pin("1234"), MemoryStorage::new())
        .build()
        .unwrap();
    service.start();

    assert!(service.poll().is_none());
    assert_eq!(service.on_write(b"9999"), None);
    assert_eq!(service.on_write(b"1234"), None);
    assert_eq!(service.poll(), Some(Ok(Response::Accepted)));
    assert!(service.poll().is_none());
}

#[test]
fn disconnect_drops_pending_command() {
    let service = PinpadService::builder(PinpadConfig::pin("1234"), MemoryStorage::new())
        .build()
        .unwrap();
    service.start();

    service.on_write(b"1234");
    service.on_client_disconnect();
    assert!(service.poll().is_none());
    assert_eq!(service.status(), Status::Idle);
}

#[test]
fn write_during_evaluation_is_busy() {
    type Service = PinpadService<MemoryStorage>;

    let handle: Arc<OnceLock<Arc<Service>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let inner_handle = handle.clone();
    let inner_seen = seen.clone();
    let service = Arc::new(
        PinpadService::builder(
            PinpadConfig::hotp(example_secret()),
            MemoryStorage::with_counter(0),
        )
        .on_accepted(move || -> Result<(), TriggerError> {
            let service = inner_handle.get().expect("service registered");
            let mut seen = inner_seen.lock().unwrap();
            seen.push(service.on_command_written(&hotp_code(1)));
            seen.push(Ok(service.on_write(&hotp_code(1)).unwrap_or(Response::Accepted)));
            Ok(())
        })
        .build()
        .unwrap(),
    );
    assert!(handle.set(service.clone()).is_ok());
    service.start();

    assert_eq!(service.on_command_written(&hotp_code(0)), Ok(Response::Accepted));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Ok(Response::Busy), Ok(Response::Busy)]
    );
    // the busy write never touched the counter or the pending slot
    assert_eq!(service.on_counter_read(), 1);
    assert!(service.poll().is_none());
    // the dropped writer reads busy; the verdict is still known
    assert_eq!(service.busy_drops(), 2);
    assert_eq!(service.last_response(), Some(Response::Busy));
    assert_eq!(service.last_outcome(), Some(Response::Accepted));
    assert_eq!(service.status(), Status::Accepted);

    // the next evaluation clears the marker
    assert_eq!(service.on_command_written(b"000000"), Ok(Response::Rejected));
    assert_eq!(service.last_response(), Some(Response::Rejected));
}

#[test]
fn concurrent_submissions_never_share_a_counter() {
    let service = Arc::new(
        PinpadService::builder(
            PinpadConfig::hotp(example_secret()),
            MemoryStorage::with_counter(0),
        )
        .build()
        .unwrap(),
    );
    service.start();
    let code = hotp_code(0);

    let responses: Vec<Response> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let code = code.clone();
                scope.spawn(move || service.on_command_written(&code).unwrap())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let accepted = responses.iter().filter(|r| **r == Response::Accepted).count();
    assert_eq!(accepted, 1, "{responses:?}");
    assert_eq!(service.on_counter_read(), 1);
}

#[test]
fn invalid_config_is_refused_at_build() {
    let result = PinpadService::builder(PinpadConfig::pin("12ab"), MemoryStorage::new()).build();
    assert!(matches!(result, Err(PinpadError::Config(_))));
}
