//! Receive-side ingestion with packet-loss recovery.
//!
//! [`RxIngestor`] pulls one datagram per [`read_one`](RxIngestor::read_one)
//! call from a [`DatagramSource`], decodes it, and checks the 4-bit packet
//! counter. When packets go missing it inserts one packet's worth of zero
//! samples for each, so the sample timeline keeps advancing at the nominal
//! rate. Loss is reported through the returned block, a
//! [`StreamEvent::PacketsDropped`] broadcast, and [`RxStats`].
//!
//! [`fill`](RxIngestor::fill) adapts the per-datagram blocks to
//! caller-sized buffers, tagging loss and metadata at absolute sample
//! offsets.
//!
//! # Example
//!
//! ```no_run
//! use vrtlink_core::{FrameProfile, IqSample};
//! use vrtlink_stream::rx::RxIngestorBuilder;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! let mut rx = RxIngestorBuilder::new(FrameProfile::framed(1536))
//!     .port(42820)
//!     .rate_index(9)
//!     .tagging(true)
//!     .build()
//!     .await?;
//!
//! let mut buf = vec![IqSample::ZERO; 4096];
//! let report = rx.fill(&mut buf).await?;
//! for tag in &report.tags {
//!     println!("{:?}", tag);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tokio::sync::broadcast;

use vrtlink_core::error::{ConfigError, Error, Result, RxError};
use vrtlink_core::events::StreamEvent;
use vrtlink_core::rate::RateTable;
use vrtlink_core::transport::DatagramSource;
use vrtlink_core::types::{FrameProfile, IqSample};
use vrtlink_transport::UdpTransport;

use crate::metadata::DdcMetadata;
use crate::vita49::{DecodedPacket, FrameCodec};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Extra receive-buffer bytes used to notice datagrams longer than the
/// profile's frame.
const RECV_SLACK: usize = 64;

/// Where the ingestor is in its receive cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Nothing received or buffered.
    Idle,
    /// Waiting for a datagram.
    AwaitingPacket,
    /// Samples from a decoded frame are buffered for the next `fill`.
    HaveFrame,
}

/// Packet-counter tracking for loss detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossWindow {
    expected_counter: u8,
    seen: bool,
}

impl LossWindow {
    /// A window that has not seen a packet yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the counter of a received packet and return how many packets
    /// are missing before it.
    ///
    /// The first packet only primes the window. Afterwards the gap is
    /// `(received - expected - 1) mod 16`, and the window follows the
    /// received counter whatever the gap.
    pub fn observe(&mut self, received: u8) -> u8 {
        let received = received & 0x0F;
        if !self.seen {
            self.seen = true;
            self.expected_counter = received;
            return 0;
        }
        let gap = received
            .wrapping_sub(self.expected_counter)
            .wrapping_sub(1)
            & 0x0F;
        self.expected_counter = received;
        gap
    }

    /// Counter of the last packet observed.
    pub fn expected_counter(&self) -> u8 {
        self.expected_counter
    }

    /// Whether a packet has been observed.
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Forget the stream position.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One received datagram placed on the sample timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxBlock {
    /// The decoded frame.
    pub packet: DecodedPacket,
    /// Packets missing immediately before this one.
    pub gap_packets: u32,
    /// Zero samples synthesized for the missing packets.
    pub gap_samples: usize,
    /// Absolute timeline offset of the first sample (synthesized or not).
    pub offset: u64,
    /// Frame metadata, when tagging is enabled and the profile has a VITA
    /// header.
    pub metadata: Option<DdcMetadata>,
}

impl RxBlock {
    /// The loss preceding this block, if any.
    pub fn loss(&self) -> Option<RxError> {
        (self.gap_packets > 0).then_some(RxError::Dropped {
            count: self.gap_packets,
        })
    }

    /// Timeline samples this block covers.
    pub fn sample_count(&self) -> usize {
        self.gap_samples + self.packet.samples.len()
    }

    /// Synthesized zeros followed by the received samples.
    pub fn samples(&self) -> impl Iterator<Item = IqSample> + '_ {
        std::iter::repeat_n(IqSample::ZERO, self.gap_samples)
            .chain(self.packet.samples.iter().copied())
    }
}

/// What a tag marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    /// `count` packets were replaced with zeros starting here.
    Dropped {
        /// Packets replaced.
        count: u32,
    },
    /// The frame starting here carried this metadata.
    Metadata(DdcMetadata),
}

/// A tag at an absolute sample offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTag {
    /// Absolute sample offset.
    pub offset: u64,
    /// What happened there.
    pub kind: TagKind,
}

/// Result of one [`RxIngestor::fill`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReport {
    /// Absolute offset of `out[0]`.
    pub start: u64,
    /// Samples written. Less than the buffer length only when the source
    /// failed part way; the error is returned by the next call.
    pub written: usize,
    /// Tags falling inside the written range, in offset order.
    pub tags: Vec<SampleTag>,
}

/// Receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Frames decoded.
    pub packets: u64,
    /// Packets detected missing.
    pub dropped_packets: u64,
    /// Zero samples synthesized for missing packets.
    pub synthesized_samples: u64,
    /// Timeline samples produced, synthesized ones included.
    pub samples: u64,
    /// Datagrams shorter than a frame.
    pub truncated: u64,
    /// Datagrams longer than a frame.
    pub oversize: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
}

/// Receive-side stream engine.
pub struct RxIngestor {
    source: Box<dyn DatagramSource>,
    codec: FrameCodec,
    buf: Vec<u8>,
    state: RxState,
    window: LossWindow,
    rate_index: Option<u8>,
    tagging: bool,
    /// Timeline offset of the next sample `read_one` will produce.
    next_offset: u64,
    /// Timeline offset of the next sample `fill` will deliver.
    delivered: u64,
    pending: VecDeque<IqSample>,
    pending_tags: VecDeque<SampleTag>,
    deferred_error: Option<Error>,
    stats: RxStats,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl std::fmt::Debug for RxIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxIngestor")
            .field("profile", self.codec.profile())
            .field("state", &self.state)
            .field("window", &self.window)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl RxIngestor {
    /// The stream's profile.
    pub fn profile(&self) -> &FrameProfile {
        self.codec.profile()
    }

    /// Current receive state.
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Loss-detection window.
    pub fn loss_window(&self) -> &LossWindow {
        &self.window
    }

    /// Sample rate of the configured rate index.
    pub fn sample_rate(&self) -> Option<u32> {
        self.rate_index.and_then(RateTable::sample_rate)
    }

    /// Receive counters.
    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Subscribe to loss events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Receive and decode exactly one datagram.
    ///
    /// # Errors
    ///
    /// - [`RxError::Truncated`] for a datagram shorter than the frame. The
    ///   datagram is discarded and the next call starts clean.
    /// - [`Error::Codec`] if the frame's header describes more data than
    ///   arrived.
    /// - Whatever the source reports, e.g. [`Error::StreamClosed`].
    pub async fn read_one(&mut self) -> Result<RxBlock> {
        let profile = *self.codec.profile();
        let frame_size = profile.frame_size();

        self.state = RxState::AwaitingPacket;
        let received = self.source.recv_datagram(&mut self.buf).await;
        self.state = RxState::Idle;
        let n = received?;

        if n < frame_size {
            self.stats.truncated += 1;
            tracing::warn!(expected = frame_size, actual = n, "Truncated datagram discarded");
            return Err(RxError::Truncated {
                expected: frame_size,
                actual: n,
            }
            .into());
        }
        if n > frame_size {
            self.stats.oversize += 1;
            tracing::debug!(
                expected = frame_size,
                actual = n,
                "Oversize datagram, decoding leading frame"
            );
        }

        let packet = self.codec.decode(&self.buf[..n]).map_err(|e| {
            self.stats.decode_errors += 1;
            tracing::warn!(error = %e, "Frame decode failed");
            Error::from(e)
        })?;

        let has_header = profile.kind.has_vita_header();
        let gap_packets = if has_header {
            self.window.observe(packet.packet_count) as u32
        } else {
            0
        };
        let gap_samples = gap_packets as usize * profile.samples_per_packet();
        let offset = self.next_offset;

        if gap_packets > 0 {
            self.stats.dropped_packets += gap_packets as u64;
            self.stats.synthesized_samples += gap_samples as u64;
            tracing::warn!(
                stream_id = format_args!("{:#010x}", packet.stream_id),
                count = gap_packets,
                offset,
                received = packet.packet_count,
                "Packets dropped, inserting silence"
            );
            let _ = self.event_tx.send(StreamEvent::PacketsDropped {
                stream_id: packet.stream_id,
                count: gap_packets,
                offset,
            });
        }

        let metadata = (self.tagging && has_header).then(|| DdcMetadata::from_packet(&packet));

        let block = RxBlock {
            packet,
            gap_packets,
            gap_samples,
            offset,
            metadata,
        };
        self.stats.packets += 1;
        self.stats.samples += block.sample_count() as u64;
        self.next_offset += block.sample_count() as u64;

        tracing::trace!(
            counter = block.packet.packet_count,
            offset,
            samples = block.sample_count(),
            "Frame received"
        );

        Ok(block)
    }

    /// Fill `out` from the sample timeline.
    ///
    /// Samples left over from the last datagram are carried to the next
    /// call. Truncated and undecodable datagrams are skipped (they are
    /// counted in [`stats`](Self::stats)); other source errors end the fill.
    ///
    /// Cancel-safe: datagrams are staged before anything is copied into
    /// `out`, so dropping the future loses no samples.
    pub async fn fill(&mut self, out: &mut [IqSample]) -> Result<FillReport> {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }

        while self.pending.len() < out.len() {
            match self.read_one().await {
                Ok(block) => self.stage(block),
                Err(Error::Rx(RxError::Truncated { .. })) | Err(Error::Codec(_)) => continue,
                Err(e) if self.pending.is_empty() => {
                    self.state = RxState::Idle;
                    return Err(e);
                }
                Err(e) => {
                    self.deferred_error = Some(e);
                    break;
                }
            }
        }

        let start = self.delivered;
        let written = out.len().min(self.pending.len());
        for (slot, sample) in out.iter_mut().zip(self.pending.drain(..written)) {
            *slot = sample;
        }
        self.delivered += written as u64;

        let mut tags = Vec::new();
        while self
            .pending_tags
            .front()
            .is_some_and(|t| t.offset < self.delivered)
        {
            if let Some(tag) = self.pending_tags.pop_front() {
                tags.push(tag);
            }
        }

        self.state = if self.pending.is_empty() {
            RxState::Idle
        } else {
            RxState::HaveFrame
        };

        Ok(FillReport {
            start,
            written,
            tags,
        })
    }

    fn stage(&mut self, block: RxBlock) {
        if block.gap_packets > 0 {
            self.pending_tags.push_back(SampleTag {
                offset: block.offset,
                kind: TagKind::Dropped {
                    count: block.gap_packets,
                },
            });
        }
        if let Some(meta) = &block.metadata {
            self.pending_tags.push_back(SampleTag {
                offset: block.offset + block.gap_samples as u64,
                kind: TagKind::Metadata(meta.clone()),
            });
        }
        self.pending.extend(block.samples());
    }
}

/// Fluent builder for [`RxIngestor`].
#[derive(Debug, Clone)]
pub struct RxIngestorBuilder {
    profile: FrameProfile,
    bind_address: Option<String>,
    rate_index: Option<u8>,
    tagging: bool,
    event_capacity: usize,
}

impl RxIngestorBuilder {
    /// Start a builder for a stream with the given profile.
    pub fn new(profile: FrameProfile) -> Self {
        RxIngestorBuilder {
            profile,
            bind_address: None,
            rate_index: None,
            tagging: false,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Listen on `port` on all interfaces.
    pub fn port(mut self, port: u16) -> Self {
        self.bind_address = Some(format!("0.0.0.0:{}", port));
        self
    }

    /// Listen on a specific `host:port`.
    pub fn bind_address(mut self, addr: &str) -> Self {
        self.bind_address = Some(addr.to_string());
        self
    }

    /// Set the DDC rate index, used by [`RxIngestor::sample_rate`].
    pub fn rate_index(mut self, index: u8) -> Self {
        self.rate_index = Some(index);
        self
    }

    /// Attach [`DdcMetadata`] to every block (default: off).
    pub fn tagging(mut self, enabled: bool) -> Self {
        self.tagging = enabled;
        self
    }

    /// Set the event channel capacity (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    fn validate(&self, needs_address: bool) -> Result<()> {
        let mut err = ConfigError::new();
        if needs_address && self.bind_address.is_none() {
            err.missing("port");
        }
        if self.profile.payload_size == 0 || self.profile.payload_size % 4 != 0 {
            err.invalid(format!(
                "payload size {} is not a positive multiple of 4",
                self.profile.payload_size
            ));
        }
        if let Some(index) = self.rate_index {
            if RateTable::sample_rate(index).is_none() {
                err.invalid(format!("unknown rate index {}", index));
            }
        }
        err.into_result()?;
        Ok(())
    }

    /// Bind the UDP socket and build the ingestor.
    pub async fn build(self) -> Result<RxIngestor> {
        self.validate(true)?;
        let addr = self.bind_address.clone().unwrap_or_default();
        let transport = UdpTransport::bind(&addr).await?;
        tracing::info!(
            local = %transport.local_addr(),
            kind = ?self.profile.kind,
            frame_size = self.profile.frame_size(),
            "RX stream listening"
        );
        self.build_with_source(Box::new(transport))
    }

    /// Build the ingestor over a caller-provided datagram source.
    ///
    /// This is the entry point for testing with a `MockDatagramSource`.
    pub fn build_with_source(self, source: Box<dyn DatagramSource>) -> Result<RxIngestor> {
        self.validate(false)?;
        let (event_tx, _) = broadcast::channel(self.event_capacity);
        Ok(RxIngestor {
            source,
            codec: FrameCodec::new(self.profile),
            buf: vec![0u8; self.profile.frame_size() + RECV_SLACK],
            state: RxState::Idle,
            window: LossWindow::new(),
            rate_index: self.rate_index,
            tagging: self.tagging,
            next_offset: 0,
            delivered: 0,
            pending: VecDeque::new(),
            pending_tags: VecDeque::new(),
            deferred_error: None,
            stats: RxStats::default(),
            event_tx,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
