//! Shutdown coordination.
//!
//! [`LifecycleController`] is the only place that stops the generator on
//! behalf of the process. It captures the exact resume point with an atomic
//! snapshot-and-stop, writes it as a full progress record and then cancels
//! the shutdown token the accept loop is watching.

use crate::server::service::rollover::PersistOnRollover;
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use txnid::{ProgressStore, RolloverHook, Snapshot, TxnIdGenerator};

pub struct LifecycleController<H = PersistOnRollover>
where
    H: RolloverHook,
{
    generator: Arc<TxnIdGenerator<H>>,
    store: ProgressStore,
    shutdown: CancellationToken,
}

impl<H> Clone for LifecycleController<H>
where
    H: RolloverHook,
{
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            store: self.store.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<H> LifecycleController<H>
where
    H: RolloverHook + 'static,
{
    pub fn new(
        generator: Arc<TxnIdGenerator<H>>,
        store: ProgressStore,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            generator,
            store,
            shutdown,
        }
    }

    /// Stops issuance and persists the exact resume point.
    ///
    /// The stop is never undone, even when the write fails: the process is
    /// shutting down and must not hand out IDs that the progress file does
    /// not account for. The shutdown token is cancelled on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator lock is poisoned or the full record
    /// cannot be written. Both are also logged.
    pub fn stop_and_persist(&self) -> anyhow::Result<Snapshot> {
        let result = self.persist_snapshot();
        self.shutdown.cancel();
        result
    }

    fn persist_snapshot(&self) -> anyhow::Result<Snapshot> {
        let snapshot = self
            .generator
            .snapshot(true)
            .inspect_err(|e| tracing::error!("Failed to snapshot generator: {e}"))
            .context("failed to snapshot generator")?;

        tracing::info!(%snapshot, "Issuance stopped");

        self.store
            .write_full(&snapshot.to_record())
            .inspect_err(|e| {
                tracing::error!(%snapshot, "Failed to persist resume point: {e}");
            })
            .with_context(|| {
                format!(
                    "failed to persist resume point to {}",
                    self.store.path().display()
                )
            })?;

        tracing::info!(path = %self.store.path().display(), "Resume point persisted");
        Ok(snapshot)
    }

    /// Waits for SIGINT or SIGTERM, then runs [`Self::stop_and_persist`].
    ///
    /// SIGHUP is logged and ignored. Returns `Ok(None)` without touching the
    /// generator if the shutdown token is cancelled by someone else first.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers cannot be installed, or if
    /// [`Self::stop_and_persist`] fails.
    pub async fn run(self) -> anyhow::Result<Option<Snapshot>> {
        tokio::select! {
            () = self.shutdown.cancelled() => return Ok(None),
            signal = wait_for_termination() => {
                let name = signal?;
                tracing::info!("Received {name}, shutting down");
            }
        }

        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.stop_and_persist())
            .await
            .context("shutdown task panicked")?
            .map(Some)
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => return Ok("SIGINT"),
            _ = terminate.recv() => return Ok("SIGTERM"),
            _ = hangup.recv() => tracing::info!("Received SIGHUP, ignoring"),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    Ok("Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use txnid::{IdStatus, NoRollover, ProgressRecord};

    struct Fixture {
        generator: Arc<TxnIdGenerator<NoRollover>>,
        token: CancellationToken,
        controller: LifecycleController<NoRollover>,
    }

    fn fixture(store: ProgressStore) -> Fixture {
        let generator = Arc::new(TxnIdGenerator::new(5, 2, 3));
        let token = CancellationToken::new();
        let controller = LifecycleController::new(Arc::clone(&generator), store, token.clone());
        Fixture {
            generator,
            token,
            controller,
        }
    }

    #[test]
    fn persists_exact_resume_point() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::in_dir(dir.path());
        let Fixture {
            generator,
            token,
            controller,
        } = fixture(store.clone());

        generator.next_id();
        generator.next_id();

        let snapshot = controller.stop_and_persist().unwrap();
        assert_eq!(snapshot.counter, 8);
        assert!(token.is_cancelled());
        assert!(generator.next_id().is_stopped());

        let record = store.load().unwrap().unwrap();
        assert_eq!(record, ProgressRecord::full(5, 8, 3));

        let resumed = record.resolve(0, 1);
        let next = TxnIdGenerator::new(resumed.base, resumed.counter, resumed.increment);
        assert_eq!(
            next.next_id(),
            IdStatus::Ready {
                id: (5 << 16) | 8
            }
        );
    }

    #[test]
    fn write_failure_still_stops_and_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::in_dir(dir.path().join("missing"));
        let Fixture {
            generator,
            token,
            controller,
        } = fixture(store);

        let err = controller.stop_and_persist().unwrap_err();
        assert!(err.to_string().contains("failed to persist resume point"));
        assert!(token.is_cancelled());
        assert!(generator.next_id().is_stopped());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_returns_when_cancelled_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let Fixture {
            generator,
            token,
            controller,
        } = fixture(ProgressStore::in_dir(dir.path()));

        let task = tokio::spawn(controller.run());
        token.cancel();

        assert_eq!(task.await.unwrap().unwrap(), None);
        assert!(!generator.next_id().is_stopped());
    }
}
