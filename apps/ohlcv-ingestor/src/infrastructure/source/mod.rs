//! Envelope Sources and Partition Routing
//!
//! In-process adapters for the inbound envelope stream. The real feed
//! connector and bus transport are external collaborators; they hand
//! envelopes to the pipeline through bounded mpsc channels, one channel
//! per worker partition.
//!
//! Routing invariant: the same symbol must always land on the same
//! worker, or duplicate suppression silently fails (two workers would
//! admit the same fingerprint independently). The dispatcher therefore
//! routes by the transport's partition key when present and falls back
//! to peeking the symbol out of the payload.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;

use crate::application::ports::{EnvelopeSource, RawEnvelope};

/// Stable partition index for a symbol (FNV-1a over the symbol bytes).
///
/// Must be fixed at deployment and match the upstream transport's
/// partitioning.
#[must_use]
pub fn partition_for_symbol(symbol: &str, workers: usize) -> usize {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    if workers <= 1 {
        return 0;
    }

    let mut hash = FNV_OFFSET;
    for byte in symbol.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % workers as u64) as usize
}

/// Envelope source backed by a bounded mpsc channel.
#[derive(Debug)]
pub struct ChannelEnvelopeSource {
    rx: mpsc::Receiver<RawEnvelope>,
}

impl ChannelEnvelopeSource {
    /// Wrap a channel receiver as an envelope source.
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<RawEnvelope>) -> Self {
        Self { rx }
    }
}

#[async_trait::async_trait]
impl EnvelopeSource for ChannelEnvelopeSource {
    async fn next(&mut self) -> Option<RawEnvelope> {
        self.rx.recv().await
    }
}

/// Routes envelopes to per-worker channels by symbol partition.
pub struct EnvelopeDispatcher {
    senders: Vec<mpsc::Sender<RawEnvelope>>,
}

impl EnvelopeDispatcher {
    /// Create a dispatcher over one sender per worker.
    #[must_use]
    pub fn new(senders: Vec<mpsc::Sender<RawEnvelope>>) -> Self {
        debug_assert!(!senders.is_empty());
        Self { senders }
    }

    /// Deliver an envelope to its worker partition. Returns `false`
    /// when the target worker has shut down.
    pub async fn dispatch(&self, envelope: RawEnvelope) -> bool {
        let partition = self.partition_of(&envelope);
        self.senders[partition].send(envelope).await.is_ok()
    }

    fn partition_of(&self, envelope: &RawEnvelope) -> usize {
        let workers = self.senders.len();

        if let Some(key) = envelope.partition_key.as_deref() {
            return partition_for_symbol(key, workers);
        }

        // No transport key: peek the symbol out of the payload. Anything
        // unreadable goes to partition 0; the decoder will classify and
        // drop it there.
        peek_symbol(&envelope.payload)
            .map_or(0, |symbol| partition_for_symbol(&symbol, workers))
    }
}

/// Extract the kline symbol from a combined-stream payload without a
/// full decode.
fn peek_symbol(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value
        .pointer("/data/k/s")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

/// Envelope source reading newline-delimited payloads from a byte
/// stream (stdin in the shipped binary). Each line is one envelope.
pub struct NdjsonEnvelopeSource<R> {
    lines: Lines<BufReader<R>>,
    offset: u64,
}

impl<R: AsyncRead + Unpin> NdjsonEnvelopeSource<R> {
    /// Wrap an async reader as a line-per-envelope source.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            offset: 0,
        }
    }
}

#[async_trait::async_trait]
impl<R> EnvelopeSource for NdjsonEnvelopeSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next(&mut self) -> Option<RawEnvelope> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let offset = self.offset;
                    self.offset += 1;
                    return Some(RawEnvelope {
                        payload: line.into_bytes(),
                        partition_key: None,
                        offset: Some(offset),
                    });
                }
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read envelope line");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_is_stable() {
        let first = partition_for_symbol("BTCUSDT", 4);
        for _ in 0..100 {
            assert_eq!(partition_for_symbol("BTCUSDT", 4), first);
        }
    }

    #[test]
    fn partitioning_stays_in_range() {
        for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT", "DOGEUSDT", "X"] {
            for workers in 1..=8 {
                assert!(partition_for_symbol(symbol, workers) < workers);
            }
        }
    }

    #[test]
    fn single_worker_gets_everything() {
        assert_eq!(partition_for_symbol("BTCUSDT", 1), 0);
        assert_eq!(partition_for_symbol("ETHUSDT", 0), 0);
    }

    #[test]
    fn peek_symbol_reads_the_kline_symbol() {
        let payload = br#"{"data":{"k":{"t":1,"s":"ETHUSDT","o":"1"}}}"#;
        assert_eq!(peek_symbol(payload).as_deref(), Some("ETHUSDT"));
        assert_eq!(peek_symbol(b"garbage"), None);
        assert_eq!(peek_symbol(br#"{"data":{}}"#), None);
    }

    #[tokio::test]
    async fn dispatcher_routes_same_symbol_to_same_worker() {
        let (tx0, mut rx0) = mpsc::channel(8);
        let (tx1, mut rx1) = mpsc::channel(8);
        let dispatcher = EnvelopeDispatcher::new(vec![tx0, tx1]);

        let payload = br#"{"data":{"k":{"t":1,"s":"BTCUSDT","o":"1","h":"1","l":"1","c":"1","v":"1"}}}"#;
        for _ in 0..4 {
            assert!(
                dispatcher
                    .dispatch(RawEnvelope::from_bytes(payload.to_vec()))
                    .await
            );
        }

        let expected = partition_for_symbol("BTCUSDT", 2);
        let (full, empty) = if expected == 0 {
            (&mut rx0, &mut rx1)
        } else {
            (&mut rx1, &mut rx0)
        };
        for _ in 0..4 {
            assert!(full.try_recv().is_ok());
        }
        assert!(empty.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatcher_prefers_transport_partition_key() {
        let (tx0, mut rx0) = mpsc::channel(8);
        let (tx1, mut rx1) = mpsc::channel(8);
        let dispatcher = EnvelopeDispatcher::new(vec![tx0, tx1]);

        let envelope = RawEnvelope {
            payload: b"opaque".to_vec(),
            partition_key: Some("ETHUSDT".to_string()),
            offset: Some(7),
        };
        assert!(dispatcher.dispatch(envelope).await);

        let expected = partition_for_symbol("ETHUSDT", 2);
        if expected == 0 {
            assert!(rx0.try_recv().is_ok());
            assert!(rx1.try_recv().is_err());
        } else {
            assert!(rx1.try_recv().is_ok());
            assert!(rx0.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn ndjson_source_yields_one_envelope_per_line() {
        let input: &[u8] = b"{\"a\":1}\n\n{\"b\":2}\n";
        let mut source = NdjsonEnvelopeSource::new(input);

        let first = source.next().await.unwrap();
        assert_eq!(first.payload, b"{\"a\":1}");
        assert_eq!(first.offset, Some(0));

        let second = source.next().await.unwrap();
        assert_eq!(second.payload, b"{\"b\":2}");
        assert_eq!(second.offset, Some(1));

        assert!(source.next().await.is_none());
    }
}
