//! Transport traits for radio communication.
//!
//! The stream engines never touch sockets directly. They operate on these
//! traits so that the same RX loss detector, flow controller and
//! packetizer run against real UDP/TCP sockets (`vrtlink-transport`) and
//! against the deterministic mocks in `vrtlink-test-harness`.

use std::io::IoSlice;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A source of whole datagrams.
#[async_trait]
pub trait DatagramSource: Send {
    /// Wait for the next datagram and copy it into `buf`.
    ///
    /// Returns the number of bytes written. There is no timeout: the call
    /// waits until a datagram arrives or the source is closed, in which
    /// case it returns [`Error::StreamClosed`](crate::error::Error::StreamClosed).
    /// Bytes beyond `buf.len()` are discarded, as with a UDP socket.
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// A sink accepting one datagram per call, gathered from several buffers.
#[async_trait]
pub trait DatagramSink: Send {
    /// Send the concatenation of `bufs` as a single datagram.
    ///
    /// Returns the number of bytes the kernel accepted. Callers compare it
    /// with the total length to detect short writes; the sink does not
    /// retry.
    async fn send_datagram(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize>;
}

/// The radio's text command channel.
///
/// Line-oriented ASCII request/response: one command line out, zero or
/// more reply lines back. Failures are reported as errors and never
/// swallowed.
#[async_trait]
pub trait CommandSession: Send + Sync {
    /// Send `text` and collect the reply lines, waiting at most `timeout`.
    async fn send_command(&self, text: &str, timeout: Duration) -> Result<Vec<String>>;
}
