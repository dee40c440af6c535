/// Callback invoked by [`TxnIdGenerator`] whenever the counter range is
/// exhausted and `base` advances to a new range.
///
/// The hook receives the **new** seed (`base >> 16`), i.e. the range that
/// identifiers are now being issued from. Implementations that persist
/// progress should store `seed + 1` so that a restart after a crash resumes
/// in a range that was never handed out.
///
/// # Contract
///
/// The hook runs synchronously while the generator lock is held. It must:
/// - complete in bounded, small time (no unbounded I/O, no waiting on
///   external resources);
/// - never call back into the generator, which would deadlock.
///
/// [`TxnIdGenerator`]: crate::TxnIdGenerator
pub trait RolloverHook: Send + Sync {
    /// Called once per rollover with the new seed.
    fn on_rollover(&self, seed: u64);
}

/// A [`RolloverHook`] that does nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoRollover;

impl RolloverHook for NoRollover {
    #[inline]
    fn on_rollover(&self, _seed: u64) {}
}

impl<F> RolloverHook for F
where
    F: Fn(u64) + Send + Sync,
{
    #[inline]
    fn on_rollover(&self, seed: u64) {
        self(seed);
    }
}
