//! Error types for vrtlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Socket, wire-format, flow-control and
//! configuration failures are all captured here; the narrower
//! [`CodecError`], [`RxError`] and [`ConfigError`] types describe the
//! failures of a single component and convert into [`Error`] with `?`.

/// The error type for all vrtlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level failure on an established socket (short write,
    /// send refused by the kernel).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected command reply, malformed status
    /// datagram).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a reply from the radio.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to an operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The session or socket has not been started.
    #[error("not connected")]
    NotConnected,

    /// The connection to the radio was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The stream was shut down while an operation was pending.
    ///
    /// Waiters blocked on transmit credit receive this when the session
    /// stops, and datagram sources return it once they are exhausted.
    #[error("stream closed")]
    StreamClosed,

    /// Socket setup failed (bind, connect, setsockopt, interface lookup).
    ///
    /// Fatal to the `start()` that raised it; no partially configured
    /// socket is left open.
    #[error("socket error: {0}")]
    Socket(String),

    /// A received frame could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A receive-path failure.
    #[error(transparent)]
    Rx(#[from] RxError),

    /// Required configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure decoding a VITA-49 frame.
///
/// Decode aborts the offending packet only; the stream itself continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer is smaller than the profile (or the decoded header)
    /// requires.
    #[error("short buffer: need {needed} bytes, got {actual}")]
    ShortBuffer {
        /// Bytes required to decode the frame.
        needed: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// Receive-path conditions reported by the RX ingestor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RxError {
    /// A datagram shorter than the profile's frame size arrived. The
    /// receive buffer is discarded and the next read starts clean.
    #[error("truncated datagram: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Frame size required by the profile.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// Packets were lost on the wire and replaced with silence.
    ///
    /// Not fatal: the stream continues with zero samples synthesized for
    /// each missing packet.
    #[error("{count} packet(s) dropped")]
    Dropped {
        /// Number of packets missing between two received packets.
        count: u32,
    },
}

/// Aggregated configuration failure.
///
/// Validation reports every missing field at once rather than stopping at
/// the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration{}", describe(.missing, .invalid))]
pub struct ConfigError {
    /// Names of required settings that were not provided.
    pub missing: Vec<&'static str>,
    /// Settings that were provided but rejected, with the reason.
    pub invalid: Vec<String>,
}

impl ConfigError {
    /// Create an empty error to accumulate problems into.
    pub fn new() -> Self {
        ConfigError {
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Record a required setting that was not provided.
    pub fn missing(&mut self, field: &'static str) {
        self.missing.push(field);
    }

    /// Record a setting that was provided but is unusable.
    pub fn invalid(&mut self, reason: impl Into<String>) {
        self.invalid.push(reason.into());
    }

    /// Whether no problems were recorded.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> std::result::Result<(), ConfigError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ConfigError {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(missing: &[&str], invalid: &[String]) -> String {
    let mut out = String::new();
    if !missing.is_empty() {
        out.push_str(": missing ");
        out.push_str(&missing.join(", "));
    }
    if !invalid.is_empty() {
        out.push_str(if missing.is_empty() { ": " } else { "; " });
        out.push_str(&invalid.join("; "));
    }
    out
}
