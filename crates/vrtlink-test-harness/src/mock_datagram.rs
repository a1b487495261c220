//! Mock datagram endpoints for deterministic stream testing.
//!
//! [`MockDatagramSource`] replays scripted datagrams (RX sample frames or
//! TX status reports) and [`MockDatagramSink`] records every datagram a
//! packetizer writes, so stream engines can be tested without sockets.
//!
//! # Example
//!
//! ```
//! use vrtlink_core::transport::DatagramSource;
//! use vrtlink_test_harness::MockDatagramSource;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! let mut source = MockDatagramSource::from_datagrams(vec![vec![1u8, 2, 3]]);
//!
//! let mut buf = [0u8; 16];
//! let n = source.recv_datagram(&mut buf).await?;
//! assert_eq!(&buf[..n], &[1, 2, 3]);
//!
//! // Exhausted sources report the stream as closed.
//! assert!(source.recv_datagram(&mut buf).await.is_err());
//! # Ok(())
//! # }
//! ```

use std::io::IoSlice;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::transport::{DatagramSink, DatagramSource};

/// Handle used to push datagrams into a [`MockDatagramSource`] while it is
/// being read.
///
/// The source reports [`Error::StreamClosed`] once every feed handle has
/// been dropped and the queued datagrams are drained.
#[derive(Debug, Clone)]
pub struct DatagramFeed {
    tx: mpsc::UnboundedSender<Result<Vec<u8>>>,
}

impl DatagramFeed {
    /// Queue one datagram. Returns `false` if the source has been dropped.
    pub fn push(&self, datagram: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(datagram.into())).is_ok()
    }

    /// Queue a receive failure, returned by the read that reaches it.
    pub fn push_error(&self, error: Error) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// A scripted [`DatagramSource`].
#[derive(Debug)]
pub struct MockDatagramSource {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
    received: usize,
}

impl MockDatagramSource {
    /// Create an empty source and the feed that supplies it.
    ///
    /// Reads block until a datagram is pushed or the feed is dropped.
    pub fn new() -> (Self, DatagramFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, received: 0 }, DatagramFeed { tx })
    }

    /// Create a source that yields `datagrams` in order, then reports the
    /// stream as closed.
    pub fn from_datagrams<I>(datagrams: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Vec<u8>>,
    {
        let (source, feed) = Self::new();
        for datagram in datagrams {
            feed.push(datagram);
        }
        source
    }

    /// Number of datagrams delivered so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

#[async_trait]
impl DatagramSource for MockDatagramSource {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.rx.recv().await {
            Some(Err(e)) => Err(e),
            Some(Ok(datagram)) => {
                // Excess bytes are discarded, as a UDP socket would.
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                self.received += 1;
                Ok(n)
            }
            None => Err(Error::StreamClosed),
        }
    }
}

#[derive(Debug, Default)]
struct SinkState {
    sent: Vec<Vec<u8>>,
    short_writes: bool,
}

/// A recording [`DatagramSink`].
///
/// Clones share the same log, so a test can keep one handle while the
/// packetizer owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDatagramSink {
    state: Arc<Mutex<SinkState>>,
}

impl MockDatagramSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends accept one byte fewer than offered and record
    /// nothing, simulating a truncated kernel write.
    pub fn set_short_writes(&self, enabled: bool) {
        self.lock().short_writes = enabled;
    }

    /// Every datagram written so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Number of datagrams written so far.
    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// The most recent datagram, if any.
    pub fn last(&self) -> Option<Vec<u8>> {
        self.lock().sent.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        // Poisoned only by a test that already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DatagramSink for MockDatagramSink {
    async fn send_datagram(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        let mut state = self.lock();
        if state.short_writes {
            return Ok(total.saturating_sub(1));
        }
        let mut datagram = Vec::with_capacity(total);
        for buf in bufs {
            datagram.extend_from_slice(buf);
        }
        state.sent.push(datagram);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_yields_in_order_then_closes() {
        let mut source = MockDatagramSource::from_datagrams(vec![vec![1u8, 2], vec![3u8]]);
        let mut buf = [0u8; 8];

        assert_eq!(source.recv_datagram(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(source.recv_datagram(&mut buf).await.unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(source.received(), 2);

        assert!(matches!(
            source.recv_datagram(&mut buf).await,
            Err(Error::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn source_truncates_to_buffer() {
        let mut source = MockDatagramSource::from_datagrams(vec![vec![9u8; 32]]);
        let mut buf = [0u8; 4];
        assert_eq!(source.recv_datagram(&mut buf).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn feed_delivers_while_open() {
        let (mut source, feed) = MockDatagramSource::new();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = source.recv_datagram(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        assert!(feed.push(vec![7u8, 7]));
        assert_eq!(reader.await.unwrap(), vec![7, 7]);
    }

    #[tokio::test]
    async fn injected_error_then_data() {
        let (mut source, feed) = MockDatagramSource::new();
        feed.push_error(Error::Io(std::io::Error::other("icmp unreachable")));
        feed.push(vec![5u8]);

        let mut buf = [0u8; 8];
        assert!(matches!(
            source.recv_datagram(&mut buf).await,
            Err(Error::Io(_))
        ));
        assert_eq!(source.recv_datagram(&mut buf).await.unwrap(), 1);
        assert_eq!(source.received(), 1);
    }

    #[tokio::test]
    async fn sink_records_gathered_datagrams() {
        let sink = MockDatagramSink::new();
        let mut writer = sink.clone();

        let n = writer
            .send_datagram(&[IoSlice::new(b"ab"), IoSlice::new(b"cd")])
            .await
            .unwrap();

        assert_eq!(n, 4);
        assert_eq!(sink.sent(), vec![b"abcd".to_vec()]);
        assert_eq!(sink.last(), Some(b"abcd".to_vec()));
    }

    #[tokio::test]
    async fn sink_short_write() {
        let sink = MockDatagramSink::new();
        sink.set_short_writes(true);
        let mut writer = sink.clone();

        let n = writer
            .send_datagram(&[IoSlice::new(b"abcd")])
            .await
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(sink.sent_count(), 0);
    }
}
