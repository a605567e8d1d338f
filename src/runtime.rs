//! Process collaborators the device consults: the native/emulated mode flag, the
//! deterministic clock and the shutdown signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Source of the native/emulated decision.
pub trait ModeSource: Send + Sync {
    /// `true` when calls must go to the real platform implementation.
    fn is_native(&self) -> bool;
}

/// Monotonic tick source driving every timed poll loop.
pub trait Clock: Send + Sync {
    /// Ticks elapsed since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Suspend the caller for one poll interval.
    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Process-wide termination flag.
pub trait ShutdownSignal: Send + Sync {
    /// `true` once the application is exiting.
    fn is_exiting(&self) -> bool;
}

/// Settable mode flag.
#[derive(Debug, Default)]
pub struct ModeFlag(AtomicBool);

impl ModeFlag {
    /// Flag starting in the given mode.
    pub const fn new(native: bool) -> Self {
        Self(AtomicBool::new(native))
    }

    /// Switch between native and emulated.
    pub fn set_native(&self, native: bool) {
        self.0.store(native, Ordering::SeqCst);
    }
}

impl ModeSource for ModeFlag {
    fn is_native(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settable shutdown flag.
#[derive(Debug, Default)]
pub struct ExitFlag(AtomicBool);

impl ExitFlag {
    /// Unraised flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Signal termination.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ShutdownSignal for ExitFlag {
    fn is_exiting(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wall clock measured from first use.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(monotonic_timestamp_ns())
    }
}

/// Monotonic timestamp in nanoseconds.
pub fn monotonic_timestamp_ns() -> u64 {
    static START: Lazy<Instant> = Lazy::new(Instant::now);
    let elapsed = START.elapsed();
    (elapsed.as_secs() * 1_000_000_000) + elapsed.subsec_nanos() as u64
}

/// Deterministic clock that only moves when told to.
///
/// With a sleep step configured, every [`Clock::sleep`] also advances the clock by
/// that step so poll loops make progress against their timeout.
#[derive(Debug, Default)]
pub struct VirtualClock {
    ticks_ns: AtomicU64,
    sleep_step_ns: u64,
}

impl VirtualClock {
    /// Frozen clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock advancing by `step` on each sleep.
    pub fn with_sleep_step(step: Duration) -> Self {
        Self {
            ticks_ns: AtomicU64::new(0),
            sleep_step_ns: step.as_nanos() as u64,
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.ticks_ns
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.ticks_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, interval: Duration) {
        if self.sleep_step_ns > 0 {
            self.ticks_ns.fetch_add(self.sleep_step_ns, Ordering::SeqCst);
        }
        std::thread::sleep(interval);
    }
}

static NATIVE_MODE: Lazy<Arc<ModeFlag>> = Lazy::new(|| Arc::new(ModeFlag::new(false)));
static EXITING: Lazy<Arc<ExitFlag>> = Lazy::new(|| Arc::new(ExitFlag::new()));

/// Process-wide mode flag.
pub fn process_mode() -> Arc<ModeFlag> {
    NATIVE_MODE.clone()
}

/// Process-wide shutdown flag.
pub fn process_exit() -> Arc<ExitFlag> {
    EXITING.clone()
}

/// Bundle of collaborators handed to the façade and its devices.
#[derive(Clone)]
pub struct Runtime {
    /// Native/emulated decision.
    pub mode: Arc<dyn ModeSource>,
    /// Tick source for poll loops.
    pub clock: Arc<dyn Clock>,
    /// Cooperative cancellation.
    pub shutdown: Arc<dyn ShutdownSignal>,
}

impl Runtime {
    /// Process-wide flags with the wall clock.
    pub fn process() -> Self {
        Self {
            mode: process_mode(),
            clock: Arc::new(MonotonicClock),
            shutdown: process_exit(),
        }
    }

    /// Always-emulated runtime with private flags and the given clock.
    pub fn emulated(clock: Arc<dyn Clock>, shutdown: Arc<dyn ShutdownSignal>) -> Self {
        Self {
            mode: Arc::new(ModeFlag::new(false)),
            clock,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_moves_only_on_request() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.sleep(Duration::from_micros(10));
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(3));
        assert_eq!(clock.now(), Duration::from_millis(3));
    }

    #[test]
    fn virtual_clock_steps_on_sleep() {
        let clock = VirtualClock::with_sleep_step(Duration::from_millis(1));
        clock.sleep(Duration::from_micros(1));
        clock.sleep(Duration::from_micros(1));
        assert_eq!(clock.now(), Duration::from_millis(2));
    }

    #[test]
    fn flags_toggle() {
        let mode = ModeFlag::new(false);
        assert!(!mode.is_native());
        mode.set_native(true);
        assert!(mode.is_native());

        let exit = ExitFlag::new();
        assert!(!exit.is_exiting());
        exit.raise();
        assert!(exit.is_exiting());
    }
}
