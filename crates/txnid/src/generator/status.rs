use core::fmt;

/// Number of low-order bits reserved for the counter.
pub const COUNTER_BITS: u32 = 16;

/// Size of one counter range. When `counter` reaches this value it wraps
/// and `base` advances by the same amount.
pub const TICK_OVER: u64 = 1 << COUNTER_BITS;

/// Largest seed that still fits once shifted into `base`.
pub const MAX_SEED: u64 = u64::MAX >> COUNTER_BITS;

/// Represents the result of asking a [`TxnIdGenerator`] for the next ID.
///
/// - [`IdStatus::Ready`] carries a freshly issued identifier.
/// - [`IdStatus::Stopped`] means issuance has been halted (by
///   [`TxnIdGenerator::stop`] or a stopping [`TxnIdGenerator::snapshot`])
///   and nothing was mutated.
///
/// [`TxnIdGenerator`]: crate::TxnIdGenerator
/// [`TxnIdGenerator::stop`]: crate::TxnIdGenerator::stop
/// [`TxnIdGenerator::snapshot`]: crate::TxnIdGenerator::snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStatus {
    /// A unique ID was issued.
    Ready {
        /// The issued identifier, `base | counter`.
        id: u64,
    },
    /// The generator is stopped.
    Stopped,
}

impl IdStatus {
    /// Returns the issued ID, or `None` when stopped.
    pub const fn id(self) -> Option<u64> {
        match self {
            Self::Ready { id } => Some(id),
            Self::Stopped => None,
        }
    }

    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// The raw generator fields captured in a single critical section.
///
/// `base` is kept in its shifted form; use [`Snapshot::seed`] or
/// [`Snapshot::to_record`] to get the form that is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub base: u64,
    pub counter: u64,
    pub increment: u16,
}

impl Snapshot {
    /// The high-order part of `base`, as stored in progress records.
    pub const fn seed(&self) -> u64 {
        self.base >> COUNTER_BITS
    }

    /// The identifier the generator would issue next.
    pub const fn next_id(&self) -> u64 {
        self.base | self.counter
    }

    /// Builds the full progress record that resumes exactly at this state.
    pub const fn to_record(&self) -> crate::ProgressRecord {
        crate::ProgressRecord::full(self.seed(), self.counter, self.increment)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "base: {}, counter: {}, increment: {} -> next: {}",
            self.base,
            self.counter,
            self.increment,
            self.next_id()
        )
    }
}
