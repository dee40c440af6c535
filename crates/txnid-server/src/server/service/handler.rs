//! One request per connection: write a single ID line, then close.

use crate::server::telemetry::{increment_ids_issued, increment_stopped_responses};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use txnid::{IdStatus, RolloverHook, TxnIdGenerator};

/// Line written when no ID can be issued.
pub const STOPPED_RESPONSE: &str = "-1\n";

/// Renders the wire form of an [`IdStatus`].
pub fn encode_response(status: IdStatus) -> String {
    match status {
        IdStatus::Ready { id } => format!("{id}\n"),
        IdStatus::Stopped => STOPPED_RESPONSE.to_owned(),
    }
}

/// Serves one client: issues an ID, writes it and shuts the stream down.
///
/// Nothing is read from the client. Write and shutdown failures only mean
/// the client went away, so they are logged at debug level and dropped; the
/// ID is consumed either way.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn handle_connection<S, H>(mut stream: S, generator: &TxnIdGenerator<H>)
where
    S: AsyncWrite + Unpin,
    H: RolloverHook,
{
    let status = match generator.try_next_id() {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("Generator unavailable, answering as stopped: {e}");
            IdStatus::Stopped
        }
    };

    match status {
        IdStatus::Ready { .. } => increment_ids_issued(),
        IdStatus::Stopped => increment_stopped_responses(),
    }

    let response = encode_response(status);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to write response: {e}");
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("Failed to close connection: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn roundtrip(generator: &TxnIdGenerator) -> String {
        let (client, server) = tokio::io::duplex(64);
        handle_connection(server, generator).await;

        let mut client = client;
        let mut buf = String::new();
        client.read_to_string(&mut buf).await.unwrap();
        buf
    }

    #[test]
    fn responses_are_single_lines() {
        assert_eq!(encode_response(IdStatus::Ready { id: 0 }), "0\n");
        assert_eq!(
            encode_response(IdStatus::Ready { id: u64::MAX }),
            "18446744073709551615\n"
        );
        assert_eq!(encode_response(IdStatus::Stopped), "-1\n");
    }

    #[tokio::test]
    async fn writes_one_id_and_closes() {
        let generator = TxnIdGenerator::new(0, 0, 1);
        assert_eq!(roundtrip(&generator).await, "0\n");
        assert_eq!(roundtrip(&generator).await, "1\n");
    }

    #[tokio::test]
    async fn ids_carry_the_seed() {
        let generator = TxnIdGenerator::new(3, 2, 4);
        assert_eq!(roundtrip(&generator).await, format!("{}\n", (3u64 << 16) | 2));
    }

    #[tokio::test]
    async fn stopped_generator_answers_sentinel() {
        let generator = TxnIdGenerator::new(0, 0, 1);
        generator.stop().unwrap();
        assert_eq!(roundtrip(&generator).await, STOPPED_RESPONSE);

        let snapshot = generator.snapshot(false).unwrap();
        assert_eq!(snapshot.counter, 0);
    }

    #[tokio::test]
    async fn vanished_client_still_consumes_the_id() {
        let generator = TxnIdGenerator::new(0, 0, 1);
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        handle_connection(server, &generator).await;
        assert_eq!(generator.next_id(), IdStatus::Ready { id: 1 });
    }
}
