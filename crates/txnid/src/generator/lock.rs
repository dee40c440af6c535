use core::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Result,
    generator::{
        COUNTER_BITS, IdStatus, Mutex, MutexGuard, NoRollover, RolloverHook, Snapshot, TICK_OVER,
    },
};

/// Mutable state shared by every caller of a [`TxnIdGenerator`].
///
/// Only ever touched while the generator lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GeneratorState {
    base: u64,
    counter: u64,
    increment: u16,
    stopped: bool,
    /// Set once `base` cannot advance; survives [`TxnIdGenerator::restart`].
    exhausted: bool,
}

/// A lock-based transaction ID generator for sharded ticket servers.
///
/// Each issued ID is `base | counter`: the low 16 bits come from a counter
/// that advances by a fixed `increment`, the high 48 bits from a `base` that
/// advances by one range whenever the counter wraps. Instances sharing the
/// same `increment` but started at distinct counter offsets in
/// `[0, increment)` never issue the same ID.
///
/// All reads and writes happen under a single mutex, so IDs are issued in
/// lock-acquisition order and no two callers ever observe the same state.
///
/// ## Features
/// - ✅ Thread-safe (share it behind an [`Arc`](std::sync::Arc))
/// - ✅ Atomic snapshot-and-stop for crash-safe shutdown
/// - ✅ Injected [`RolloverHook`] for progress persistence
///
/// ## See Also
/// - [`ProgressStore`](crate::ProgressStore)
pub struct TxnIdGenerator<H = NoRollover>
where
    H: RolloverHook,
{
    state: Mutex<GeneratorState>,
    hook: H,
}

impl TxnIdGenerator<NoRollover> {
    /// Creates a generator with no rollover hook.
    ///
    /// # Example
    /// ```
    /// use txnid::{IdStatus, TxnIdGenerator};
    ///
    /// let generator = TxnIdGenerator::new(0, 0, 1);
    /// assert_eq!(generator.next_id(), IdStatus::Ready { id: 0 });
    /// assert_eq!(generator.next_id(), IdStatus::Ready { id: 1 });
    /// ```
    pub fn new(seed: u64, start: u64, increment: u16) -> Self {
        Self::with_hook(seed, start, increment, NoRollover)
    }
}

impl<H> TxnIdGenerator<H>
where
    H: RolloverHook,
{
    /// Creates a generator that calls `hook` on every rollover.
    ///
    /// # Parameters
    ///
    /// - `seed`: the high-order part of the ID space; `base` starts at
    ///   `seed << 16`. Must not exceed [`MAX_SEED`](crate::MAX_SEED).
    /// - `start`: the initial counter, i.e. this instance's shard offset.
    ///   Must be below `65536`, and below `increment` when sharding.
    /// - `increment`: the shard count; must be positive.
    /// - `hook`: see the [`RolloverHook`] contract. It runs under the lock.
    ///
    /// # Example
    /// ```
    /// use std::sync::atomic::{AtomicU64, Ordering};
    /// use std::sync::Arc;
    /// use txnid::{IdStatus, TxnIdGenerator};
    ///
    /// let last_seed = Arc::new(AtomicU64::new(0));
    /// let seen = Arc::clone(&last_seed);
    /// let generator = TxnIdGenerator::with_hook(0, 65535, 1, move |seed: u64| {
    ///     seen.store(seed, Ordering::Relaxed);
    /// });
    ///
    /// assert_eq!(generator.next_id(), IdStatus::Ready { id: 65535 });
    /// assert_eq!(last_seed.load(Ordering::Relaxed), 1);
    /// ```
    pub fn with_hook(seed: u64, start: u64, increment: u16, hook: H) -> Self {
        debug_assert!(seed <= crate::MAX_SEED, "seed {seed} overflows base");
        debug_assert!(start < TICK_OVER, "start {start} outside counter range");
        debug_assert!(increment > 0, "increment must be positive");
        Self {
            state: Mutex::new(GeneratorState {
                base: seed << COUNTER_BITS,
                counter: start,
                increment,
                stopped: false,
                exhausted: false,
            }),
            hook,
        }
    }

    /// Returns a reference to the installed rollover hook.
    pub fn hook(&self) -> &H {
        &self.hook
    }

    #[cfg(not(feature = "parking-lot"))]
    fn lock(&self) -> Result<MutexGuard<'_, GeneratorState>> {
        Ok(self.state.lock()?)
    }

    #[cfg(feature = "parking-lot")]
    #[allow(clippy::unnecessary_wraps)]
    fn lock(&self) -> Result<MutexGuard<'_, GeneratorState>> {
        Ok(self.state.lock())
    }

    /// Issues the next ID, or reports that the generator is stopped.
    ///
    /// A poisoned lock is reported as [`IdStatus::Stopped`]: no ID can be
    /// issued safely once a hook has panicked mid-rollover. Use
    /// [`Self::try_next_id`] to tell the two apart.
    pub fn next_id(&self) -> IdStatus {
        self.try_next_id().unwrap_or(IdStatus::Stopped)
    }

    /// A fallible version of [`Self::next_id`].
    ///
    /// Under the lock: if stopped, returns [`IdStatus::Stopped`] without
    /// touching state. Otherwise returns `base | counter`, then advances the
    /// counter by `increment`. When the counter leaves the 16-bit range it
    /// wraps and `base` moves to the next range, at which point the hook is
    /// invoked with the new seed before the lock is released.
    ///
    /// If `base` is already in the last range the generator stops itself
    /// rather than wrapping around to IDs it has issued before.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`](crate::Error) if a previous holder of
    /// the lock panicked (std mutex only).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_next_id(&self) -> Result<IdStatus> {
        let mut state = self.lock()?;
        if state.stopped {
            return Ok(IdStatus::Stopped);
        }

        let id = state.base | state.counter;

        state.counter += u64::from(state.increment);
        // `increment` is a u16, so a single subtraction always normalizes.
        if state.counter >= TICK_OVER {
            state.counter -= TICK_OVER;
            match state.base.checked_add(TICK_OVER) {
                Some(base) => {
                    state.base = base;
                    self.hook.on_rollover(base >> COUNTER_BITS);
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("seed space exhausted, stopping generator");
                    state.stopped = true;
                    state.exhausted = true;
                }
            }
        }

        Ok(IdStatus::Ready { id })
    }

    /// Halts issuance. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn stop(&self) -> Result<()> {
        self.lock()?.stopped = true;
        Ok(())
    }

    /// Reopens issuance after [`Self::stop`]. Idempotent.
    ///
    /// Has no effect once the seed space is exhausted: the counter has
    /// already wrapped inside the last range, so every further ID would be
    /// a repeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn restart(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.stopped = state.exhausted;
        Ok(())
    }

    /// Returns whether issuance is currently halted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_stopped(&self) -> Result<bool> {
        Ok(self.lock()?.stopped)
    }

    /// Captures `base`, `counter` and `increment`, optionally stopping the
    /// generator in the same critical section.
    ///
    /// With `stop_also = true` no [`Self::try_next_id`] call can land between
    /// the read and the stop, so the returned state is exactly the state a
    /// restart must resume from.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn snapshot(&self, stop_also: bool) -> Result<Snapshot> {
        let mut state = self.lock()?;
        if stop_also {
            state.stopped = true;
        }

        Ok(Snapshot {
            base: state.base,
            counter: state.counter,
            increment: state.increment,
        })
    }
}

impl<H> fmt::Debug for TxnIdGenerator<H>
where
    H: RolloverHook,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("TxnIdGenerator");
        match self.lock() {
            Ok(state) => dbg
                .field("base", &state.base)
                .field("counter", &state.counter)
                .field("increment", &state.increment)
                .field("stopped", &state.stopped)
                .field("exhausted", &state.exhausted),
            Err(_) => dbg.field("state", &"<poisoned>"),
        };
        dbg.finish_non_exhaustive()
    }
}
