//! Accept loop for the TCP ticket service.
//!
//! The service moves through three states:
//!
//! - `Running`: accepting, one task per connection.
//! - `Draining`: the shutdown token fired; no new connections are accepted
//!   while already-dispatched handlers finish (bounded by the drain timeout).
//! - `Stopped`: the listener is dropped and `serve` returns.
//!
//! The loop is not resumable. Restarting the generator does not reopen it.

use crate::server::{service::handler::handle_connection, telemetry::increment_connections};
use core::time::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use txnid::{RolloverHook, TxnIdGenerator};

/// Runs the accept loop until `shutdown` is cancelled.
///
/// # Errors
///
/// An accept failure ends the loop and is returned as-is: without a working
/// listener there is nothing left to serve. In-flight handlers are still
/// drained first.
pub async fn serve<H>(
    listener: TcpListener,
    generator: Arc<TxnIdGenerator<H>>,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> anyhow::Result<()>
where
    H: RolloverHook + 'static,
{
    let tracker = TaskTracker::new();
    tracing::info!(addr = ?listener.local_addr().ok(), "Service running");

    let result = loop {
        // Biased so a cancelled token wins over a backlog of pending
        // connections.
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    increment_connections();
                    tracing::trace!(%peer, "Accepted connection");
                    let generator = Arc::clone(&generator);
                    tracker.spawn(async move {
                        handle_connection(stream, &generator).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Accept failed, stopping service: {e}");
                    break Err(anyhow::Error::new(e).context("failed to accept connection"));
                }
            },
        }
    };

    tracker.close();
    tracing::info!(inflight = tracker.len(), "Service draining");
    if tokio::time::timeout(drain_timeout, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            inflight = tracker.len(),
            "Drain timeout of {drain_timeout:?} elapsed, abandoning in-flight connections"
        );
    }

    drop(listener);
    tracing::info!("Service stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::{io::AsyncReadExt, net::TcpStream, task::JoinHandle};
    use txnid::NoRollover;

    async fn start(
        generator: Arc<TxnIdGenerator<NoRollover>>,
    ) -> (SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(
            listener,
            generator,
            token.clone(),
            Duration::from_secs(1),
        ));
        (addr, token, handle)
    }

    async fn fetch(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn protocol_scenario() {
        let generator = Arc::new(TxnIdGenerator::new(0, 0, 1));
        let (addr, token, handle) = start(Arc::clone(&generator)).await;

        assert_eq!(fetch(addr).await, "0\n");
        assert_eq!(fetch(addr).await, "1\n");

        generator.stop().unwrap();
        assert_eq!(fetch(addr).await, "-1\n");

        generator.restart().unwrap();
        assert_eq!(fetch(addr).await, "2\n");

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_clients_get_distinct_ids() {
        let generator = Arc::new(TxnIdGenerator::new(0, 1, 3));
        let (addr, token, handle) = start(generator).await;

        let clients: Vec<_> = (0..64).map(|_| tokio::spawn(fetch(addr))).collect();
        let mut ids = Vec::with_capacity(clients.len());
        for client in clients {
            let line = client.await.unwrap();
            let id: u64 = line.trim_end().parse().unwrap();
            assert_eq!(id % 3, 1);
            ids.push(id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_closes_the_listener() {
        let generator = Arc::new(TxnIdGenerator::new(0, 0, 1));
        let (addr, token, handle) = start(generator).await;

        token.cancel();
        handle.await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
