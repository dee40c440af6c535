use crate::server::telemetry::{increment_persist_failures, increment_rollovers};
use txnid::{ProgressStore, RolloverHook};

/// Reserves the next counter range on disk every time the generator rolls
/// over.
///
/// The generator passes the seed it has just moved to; this hook writes
/// `seed + 1`, the first range nobody has issued from yet. After a crash the
/// server resumes there, losing the rest of the current range but never
/// handing out an ID twice.
///
/// Write failures are logged and counted but do not stop issuance.
#[derive(Debug, Clone)]
pub struct PersistOnRollover {
    store: ProgressStore,
}

impl PersistOnRollover {
    pub fn new(store: ProgressStore) -> Self {
        Self { store }
    }
}

impl RolloverHook for PersistOnRollover {
    fn on_rollover(&self, seed: u64) {
        increment_rollovers();
        let reserved = seed.saturating_add(1);
        match self.store.write_partial(reserved) {
            Ok(()) => {
                tracing::debug!(seed, reserved, "Progress file rolled over");
            }
            Err(e) => {
                increment_persist_failures();
                tracing::error!(
                    seed,
                    reserved,
                    "CRITICAL: failed to persist progress, a crash now risks reissuing IDs: {e}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txnid::{IdStatus, ProgressRecord, TxnIdGenerator};

    #[test]
    fn rollover_reserves_the_following_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::in_dir(dir.path());
        let generator =
            TxnIdGenerator::with_hook(0, 65535, 1, PersistOnRollover::new(store.clone()));

        assert_eq!(store.load().unwrap(), None);
        assert_eq!(generator.next_id(), IdStatus::Ready { id: 65535 });
        assert_eq!(store.load().unwrap(), Some(ProgressRecord::partial(2)));

        for _ in 0..65536 {
            generator.next_id();
        }
        assert_eq!(store.load().unwrap(), Some(ProgressRecord::partial(3)));
    }

    #[test]
    fn failed_write_keeps_issuing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::in_dir(dir.path().join("missing"));
        let generator = TxnIdGenerator::with_hook(0, 65535, 1, PersistOnRollover::new(store));

        assert_eq!(generator.next_id(), IdStatus::Ready { id: 65535 });
        assert_eq!(generator.next_id(), IdStatus::Ready { id: 65536 });
    }
}
