use std::path::PathBuf;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `txnid` can emit.
///
/// Generation itself is infallible except for lock poisoning, which only
/// exists when the std mutex is in use (the `parking-lot` feature removes
/// it). Everything else comes from reading or writing the progress record.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The generator lock was **poisoned** by a panic while it was held,
    /// most likely from inside a rollover hook.
    #[cfg(not(feature = "parking-lot"))]
    #[error("generator lock poisoned")]
    LockPoisoned,

    /// The progress record could not be opened, read, or written.
    #[error("progress file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The progress record is larger than a record can ever be.
    #[error("progress record exceeds {max} bytes")]
    RecordTooLarge { max: usize },

    /// The progress record does not have the `base|counter|increment` shape.
    #[error("malformed progress record {raw:?}")]
    Malformed { raw: String },

    /// A progress record field is present but not a usable value.
    #[error("cannot parse {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::generator::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
