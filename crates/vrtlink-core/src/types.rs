//! Core data types shared across the vrtlink crates.

use std::fmt;

use num_complex::Complex32;

// ---------------------------------------------------------------------------
// IqSample
// ---------------------------------------------------------------------------

/// One complex baseband sample as carried on the wire: signed 16-bit I and Q.
///
/// The codec never scales samples. [`to_complex`](IqSample::to_complex)
/// normalizes to `[-1.0, 1.0)` for consumers that want floating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IqSample {
    /// In-phase component.
    pub i: i16,
    /// Quadrature component.
    pub q: i16,
}

impl IqSample {
    /// The zero sample used to fill gaps left by lost packets.
    pub const ZERO: IqSample = IqSample { i: 0, q: 0 };

    /// Create a sample from its components.
    pub const fn new(i: i16, q: i16) -> Self {
        IqSample { i, q }
    }

    /// Normalize to a complex float, full scale mapping to 1.0.
    pub fn to_complex(self) -> Complex32 {
        Complex32::new(self.i as f32 / 32768.0, self.q as f32 / 32768.0)
    }
}

impl From<(i16, i16)> for IqSample {
    fn from((i, q): (i16, i16)) -> Self {
        IqSample { i, q }
    }
}

// ---------------------------------------------------------------------------
// FrameProfile
// ---------------------------------------------------------------------------

/// Which header overlay the frame codec applies to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// No header at all: the datagram is pure I/Q payload.
    Raw,
    /// `VRLP` frame wrapper around a VITA-49 packet, closed by `VEND`.
    Framed,
    /// A bare VITA-49 packet followed by five context words, without the
    /// outer frame wrapper.
    Lean,
}

impl ProfileKind {
    /// Whether frames of this kind carry a VITA-49 header (and therefore
    /// a packet counter and metadata).
    pub fn has_vita_header(self) -> bool {
        !matches!(self, ProfileKind::Raw)
    }
}

/// Framed-profile header size for received DDC streams: marker, frame word,
/// VITA header, stream id, class id (2), integer and fractional timestamps.
pub const FRAMED_HEADER_SIZE: usize = 36;

/// Framed-profile tail size: the `VEND` end marker.
pub const FRAMED_TAIL_SIZE: usize = 4;

/// Lean-profile header size: VITA header, stream id, class id (2),
/// timestamps (3) and the five context words.
pub const LEAN_HEADER_SIZE: usize = 48;

/// Header size of the transmit template: marker, frame word, VITA header,
/// stream id, class id (2), fractional timestamp (2).
pub const TX_HEADER_SIZE: usize = 32;

/// Wire layout of one stream.
///
/// Immutable for the lifetime of a stream. The sizes are in bytes and
/// describe what the receiver should expect per datagram; the codec still
/// locates fields from the decoded header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameProfile {
    /// Header overlay.
    pub kind: ProfileKind,
    /// I/Q payload bytes per frame (4 bytes per sample).
    pub payload_size: usize,
    /// Header bytes preceding the payload.
    pub header_size: usize,
    /// Bytes following the payload (trailer, end marker).
    pub tail_size: usize,
    /// Words are little-endian on the wire rather than network order.
    pub byte_swapped: bool,
    /// I occupies the low half of each payload word rather than the high.
    pub iq_swapped: bool,
}

impl FrameProfile {
    /// Headerless stream of `payload_size` bytes per datagram.
    pub fn raw(payload_size: usize) -> Self {
        FrameProfile {
            kind: ProfileKind::Raw,
            payload_size,
            header_size: 0,
            tail_size: 0,
            byte_swapped: false,
            iq_swapped: false,
        }
    }

    /// Framed (`VRLP` ... `VEND`) receive stream.
    pub fn framed(payload_size: usize) -> Self {
        FrameProfile {
            kind: ProfileKind::Framed,
            payload_size,
            header_size: FRAMED_HEADER_SIZE,
            tail_size: FRAMED_TAIL_SIZE,
            byte_swapped: false,
            iq_swapped: false,
        }
    }

    /// Lean (no frame wrapper, five context words) receive stream.
    pub fn lean(payload_size: usize) -> Self {
        FrameProfile {
            kind: ProfileKind::Lean,
            payload_size,
            header_size: LEAN_HEADER_SIZE,
            tail_size: 0,
            byte_swapped: false,
            iq_swapped: false,
        }
    }

    /// Layout produced by the transmit packetizer for `samples_per_frame`
    /// samples, with words and I/Q halves in host order so the caller's
    /// `i16` buffer can be sent without conversion.
    pub fn tx_framed(samples_per_frame: usize) -> Self {
        let little = cfg!(target_endian = "little");
        FrameProfile {
            kind: ProfileKind::Framed,
            payload_size: samples_per_frame * 4,
            header_size: TX_HEADER_SIZE,
            tail_size: FRAMED_TAIL_SIZE,
            byte_swapped: little,
            iq_swapped: little,
        }
    }

    /// Set whether words are little-endian on the wire.
    pub fn with_byte_swap(mut self, swapped: bool) -> Self {
        self.byte_swapped = swapped;
        self
    }

    /// Set whether I is carried in the low half of each payload word.
    pub fn with_iq_swap(mut self, swapped: bool) -> Self {
        self.iq_swapped = swapped;
        self
    }

    /// Override the expected header size (for radios that omit optional
    /// header words).
    pub fn with_header_size(mut self, header_size: usize) -> Self {
        self.header_size = header_size;
        self
    }

    /// Total bytes per datagram.
    pub fn frame_size(&self) -> usize {
        self.header_size + self.payload_size + self.tail_size
    }

    /// Complex samples per frame.
    pub fn samples_per_packet(&self) -> usize {
        self.payload_size / 4
    }
}

// ---------------------------------------------------------------------------
// Flow control
// ---------------------------------------------------------------------------

/// Which threshold-triggered status reports update the transmit credit.
///
/// Periodic reports are always applied; threshold reports are applied only
/// when their trigger matches this mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    /// Apply reports raised when the ring buffer crosses its fill level.
    #[default]
    OnFill,
    /// Apply reports raised when the ring buffer crosses its empty level.
    OnEmpty,
}

/// Transmit session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TxState {
    /// No sockets are open.
    #[default]
    Stopped,
    /// The DUC is held paused while the ring buffer is filled.
    Prefilling,
    /// Frames are paced against the radio's credit.
    Streaming,
    /// The DUC is paused by request; sockets remain open.
    Paused,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxState::Stopped => "stopped",
            TxState::Prefilling => "prefilling",
            TxState::Streaming => "streaming",
            TxState::Paused => "paused",
        };
        f.write_str(s)
    }
}
