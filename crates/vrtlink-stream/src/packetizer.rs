//! Transmit framing.
//!
//! [`TxPacketizer`] wraps each block of caller samples in the transmit
//! header and trailer and writes all three pieces as one datagram with a
//! single vectored send. The sample buffer is never copied. Counters and
//! timestamp advance only after the kernel accepted the whole frame.

use std::io::IoSlice;
use std::net::SocketAddr;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::rate::RateTable;
use vrtlink_core::transport::DatagramSink;
use vrtlink_core::types::FrameProfile;
use vrtlink_transport::UdpTransport;

use crate::vita49::TxFrameTemplate;

/// Samples per transmit frame unless configured otherwise.
pub const DEFAULT_SAMPLES_PER_FRAME: usize = 1024;

/// Where and how a packetizer sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketizerConfig {
    /// Network interface whose broadcast address receives the frames.
    pub interface: String,
    /// Destination UDP port.
    pub port: u16,
    /// Send here instead of the interface broadcast address.
    pub destination: Option<SocketAddr>,
    /// Stream identifier written into every frame.
    pub stream_id: u32,
    /// Samples per frame.
    pub samples_per_frame: usize,
    /// DUC rate index.
    pub rate_index: u8,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        PacketizerConfig {
            interface: String::new(),
            port: 0,
            destination: None,
            stream_id: 0,
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            rate_index: 0,
        }
    }
}

/// Transmit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    /// Frames sent in full.
    pub frames_sent: u64,
    /// Samples sent in full frames.
    pub samples_sent: u64,
    /// Sends the kernel accepted only part of.
    pub short_writes: u64,
}

/// Frames sample blocks and sends them.
pub struct TxPacketizer {
    sink: Box<dyn DatagramSink>,
    template: TxFrameTemplate,
    rate_index: u8,
    stats: TxStats,
}

impl std::fmt::Debug for TxPacketizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxPacketizer")
            .field("template", &self.template)
            .field("rate_index", &self.rate_index)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn rate_for(index: u8) -> Result<u32> {
    RateTable::sample_rate(index)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown rate index {}", index)))
}

impl TxPacketizer {
    /// Open the transmit socket and build the frame template.
    ///
    /// Without a destination override the socket is bound to the
    /// interface's address and sends to its broadcast address on
    /// `config.port`. With an override it is bound to the wildcard address.
    ///
    /// # Errors
    ///
    /// [`Error::Socket`] for any socket or interface failure,
    /// [`Error::InvalidParameter`] for an unknown rate index or zero
    /// samples per frame.
    pub async fn start(config: &PacketizerConfig) -> Result<Self> {
        rate_for(config.rate_index)?;

        let transport = match config.destination {
            None => UdpTransport::bind_interface_broadcast(&config.interface, config.port).await?,
            Some(dest) => {
                let mut transport = UdpTransport::bind("0.0.0.0:0").await?;
                transport.set_broadcast(true)?;
                transport.set_destination(dest);
                tracing::info!(
                    local = %transport.local_addr(),
                    destination = %dest,
                    "Transmit socket ready"
                );
                transport
            }
        };

        Self::with_sink(Box::new(transport), config)
    }

    /// Build a packetizer over a caller-provided sink.
    ///
    /// `config.interface`, `port` and `destination` are not used.
    pub fn with_sink(sink: Box<dyn DatagramSink>, config: &PacketizerConfig) -> Result<Self> {
        let rate = rate_for(config.rate_index)?;
        let profile = FrameProfile::tx_framed(config.samples_per_frame);
        let template = TxFrameTemplate::new(&profile, config.stream_id, rate)?;

        Ok(TxPacketizer {
            sink,
            template,
            rate_index: config.rate_index,
            stats: TxStats::default(),
        })
    }

    /// Send one frame of interleaved I/Q samples.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] unless `samples.len()` is twice the
    ///   samples per frame. Nothing is sent.
    /// - [`Error::Transport`] if the kernel accepted part of the frame.
    ///   Counters are left unchanged and nothing is retried.
    pub async fn send(&mut self, samples: &[i16]) -> Result<()> {
        let expected = 2 * self.template.samples_per_frame();
        if samples.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "frame needs {} interleaved values, got {}",
                expected,
                samples.len()
            )));
        }

        let payload: &[u8] = bytemuck::cast_slice(samples);
        let total = self.template.frame_bytes();
        let bufs = [
            IoSlice::new(self.template.header()),
            IoSlice::new(payload),
            IoSlice::new(self.template.trailer()),
        ];
        let written = self.sink.send_datagram(&bufs).await?;

        if written != total {
            self.stats.short_writes += 1;
            tracing::error!(written, total, "Short write on transmit frame");
            return Err(Error::Transport(format!(
                "short write: {} of {} bytes",
                written, total
            )));
        }

        tracing::trace!(
            frame = self.template.frame_count(),
            counter = self.template.packet_count(),
            seconds = self.template.seconds(),
            ticks = self.template.ticks(),
            "Frame sent"
        );

        self.template.advance();
        self.stats.frames_sent += 1;
        self.stats.samples_sent += self.template.samples_per_frame() as u64;
        Ok(())
    }

    /// Switch to another DUC rate, keeping counters and timestamp.
    pub fn set_rate_index(&mut self, index: u8) -> Result<()> {
        let rate = rate_for(index)?;
        self.template.set_sample_rate(rate)?;
        self.rate_index = index;
        tracing::debug!(index, rate, "Transmit rate changed");
        Ok(())
    }

    /// Current DUC rate index.
    pub fn rate_index(&self) -> u8 {
        self.rate_index
    }

    /// Sample rate of the current rate index.
    pub fn sample_rate(&self) -> u32 {
        RateTable::sample_rate(self.rate_index).unwrap_or_default()
    }

    /// Samples per frame.
    pub fn samples_per_frame(&self) -> usize {
        self.template.samples_per_frame()
    }

    /// The frame template, describing the next frame to be sent.
    pub fn template(&self) -> &TxFrameTemplate {
        &self.template
    }

    /// Transmit counters.
    pub fn stats(&self) -> TxStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vita49::VitaHeader;
    use std::time::Duration;
    use vrtlink_core::types::IqSample;
    use vrtlink_test_harness::MockDatagramSink;

    const SPF: usize = 1024;

    fn config() -> PacketizerConfig {
        PacketizerConfig {
            stream_id: 0x8400_0000,
            rate_index: 9,
            ..Default::default()
        }
    }

    fn packetizer() -> (TxPacketizer, MockDatagramSink) {
        let sink = MockDatagramSink::new();
        let p = TxPacketizer::with_sink(Box::new(sink.clone()), &config()).unwrap();
        (p, sink)
    }

    fn ramp() -> Vec<i16> {
        (0..2 * SPF).map(|v| v as i16).collect()
    }

    #[tokio::test]
    async fn frame_layout() {
        let (mut p, sink) = packetizer();
        let header = p.template().header().to_vec();
        p.send(&ramp()).await.unwrap();

        let frame = sink.last().unwrap();
        assert_eq!(frame.len(), 32 + SPF * 4 + 4);
        assert_eq!(&frame[..32], &header[..]);
        assert_eq!(&frame[32..32 + SPF * 4], bytemuck::cast_slice::<i16, u8>(&ramp()));
        assert_eq!(&frame[32 + SPF * 4..], p.template().trailer());
    }

    #[tokio::test]
    async fn header_words_in_host_order() {
        let (mut p, sink) = packetizer();
        p.send(&ramp()).await.unwrap();

        let frame = sink.last().unwrap();
        let word = u32::from_ne_bytes([frame[8], frame[9], frame[10], frame[11]]);
        let vita = VitaHeader::from_word(word);
        assert_eq!(vita.packet_type, 1);
        assert!(vita.has_class_id);
        assert_eq!(vita.timestamp_frac_type, 1);
        assert_eq!(vita.packet_size, 1030);

        let first = &frame[32..36];
        let i = i16::from_ne_bytes([first[0], first[1]]);
        let q = i16::from_ne_bytes([first[2], first[3]]);
        assert_eq!(IqSample::new(i, q), IqSample::new(0, 1));
    }

    #[tokio::test]
    async fn counters_advance_per_frame() {
        let (mut p, _sink) = packetizer();
        for _ in 0..17 {
            p.send(&ramp()).await.unwrap();
        }
        assert_eq!(p.template().packet_count(), 1);
        assert_eq!(p.template().frame_count(), 17);
        assert_eq!(p.stats().frames_sent, 17);
        assert_eq!(p.stats().samples_sent, 17 * SPF as u64);
    }

    #[tokio::test]
    async fn timestamp_carries_into_seconds() {
        let (mut p, _sink) = packetizer();
        assert_eq!(p.template().frac_increment(), 524_288);
        for _ in 0..200 {
            p.send(&ramp()).await.unwrap();
        }
        assert_eq!(p.template().seconds(), 1);
        assert_eq!(p.template().ticks(), 200 * 524_288 - 102_400_000);
    }

    #[tokio::test]
    async fn wrong_length_is_rejected() {
        let (mut p, sink) = packetizer();
        let err = p.send(&[0i16; 10]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert_eq!(sink.sent_count(), 0);
        assert_eq!(p.template().packet_count(), 0);
    }

    #[tokio::test]
    async fn short_write_leaves_counters() {
        let (mut p, sink) = packetizer();
        p.send(&ramp()).await.unwrap();
        sink.set_short_writes(true);

        let err = p.send(&ramp()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(p.template().packet_count(), 1);
        assert_eq!(p.template().frame_count(), 1);
        assert_eq!(p.stats().short_writes, 1);
        assert_eq!(p.stats().frames_sent, 1);

        sink.set_short_writes(false);
        p.send(&ramp()).await.unwrap();
        assert_eq!(p.template().packet_count(), 2);
    }

    #[tokio::test]
    async fn rate_change_recomputes_increment() {
        let (mut p, _sink) = packetizer();
        assert_eq!(p.sample_rate(), 200_000);

        p.set_rate_index(12).unwrap();
        assert_eq!(p.rate_index(), 12);
        assert_eq!(p.sample_rate(), 25_000);
        assert_eq!(p.template().frac_increment(), 4_194_304);

        assert!(matches!(p.set_rate_index(13), Err(Error::InvalidParameter(_))));
        assert_eq!(p.rate_index(), 12);
    }

    #[test]
    fn unknown_rate_index_is_rejected() {
        let cfg = PacketizerConfig {
            rate_index: 40,
            ..config()
        };
        let err = TxPacketizer::with_sink(Box::new(MockDatagramSink::new()), &cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn unknown_interface_is_socket_error() {
        let cfg = PacketizerConfig {
            interface: "vrt-missing0".into(),
            port: 4991,
            ..config()
        };
        assert!(matches!(TxPacketizer::start(&cfg).await, Err(Error::Socket(_))));
    }

    #[tokio::test]
    async fn start_with_destination_sends_over_udp() {
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let cfg = PacketizerConfig {
            destination: Some(receiver.local_addr()),
            samples_per_frame: 64,
            ..config()
        };
        let mut p = TxPacketizer::start(&cfg).await.unwrap();
        p.send(&[7i16; 128]).await.unwrap();

        let mut buf = [0u8; 1024];
        let n = receiver
            .recv(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, 32 + 64 * 4 + 4);
    }
}
