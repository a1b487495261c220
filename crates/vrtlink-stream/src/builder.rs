//! TxSessionBuilder -- fluent builder for starting a [`TxSession`].
//!
//! Collects the transmit configuration, validates it in one pass (every
//! missing setting is reported together), configures the DUC through the
//! command session and opens the data and status sockets.
//!
//! # Example
//!
//! ```no_run
//! use vrtlink_stream::builder::TxSessionBuilder;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! let mut tx = TxSessionBuilder::new()
//!     .interface("eth1")
//!     .command_addr("192.168.10.2:42800")
//!     .tx_channel(0)
//!     .duc_channel(0)
//!     .rate_index(9)
//!     .udp_port(42836)
//!     .start()
//!     .await?;
//!
//! let frame = vec![0i16; 2 * tx.samples_per_frame()];
//! loop {
//!     tx.send_frame(&frame).await?;
//! }
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use vrtlink_core::error::{ConfigError, Result};
use vrtlink_core::rate::RateTable;
use vrtlink_core::transport::{CommandSession, DatagramSink, DatagramSource};
use vrtlink_core::types::TriggerMode;
use vrtlink_transport::{TcpCommandSession, UdpTransport};

use crate::commands::{DEFAULT_COMMAND_TIMEOUT, DucControl};
use crate::flow::TxFlowController;
use crate::packetizer::{DEFAULT_SAMPLES_PER_FRAME, PacketizerConfig, TxPacketizer};
use crate::session::TxSession;
use crate::status::status_port;

/// DUC ring-buffer capacity in samples.
pub const DEFAULT_RING_CAPACITY: i64 = 67_108_862;

/// Credit held back from the ring buffer.
pub const DEFAULT_RESERVE: i64 = 0;

/// Pre-opened endpoints for starting a [`TxSession`] without sockets.
///
/// The transmit equivalent of `build_with_source()`; pass the
/// `vrtlink-test-harness` mocks in tests.
pub struct TxLinks {
    /// Radio command session.
    pub commands: Arc<dyn CommandSession>,
    /// Destination of transmit frames.
    pub sink: Box<dyn DatagramSink>,
    /// Source of status reports.
    pub status: Box<dyn DatagramSource>,
}

/// Fluent builder for [`TxSession`].
///
/// Interface, TX channel, DUC channel, rate index and UDP port are
/// required; everything else has a default.
pub struct TxSessionBuilder {
    interface: Option<String>,
    duc_channel: Option<u8>,
    tx_channel: Option<u8>,
    rate_index: Option<u8>,
    udp_port: Option<u16>,
    stream_id: Option<u32>,
    samples_per_frame: usize,
    ring_capacity: i64,
    reserve: i64,
    trigger_mode: TriggerMode,
    status_port: Option<u16>,
    destination: Option<SocketAddr>,
    command_addr: Option<String>,
    command_session: Option<Arc<dyn CommandSession>>,
    command_timeout: Duration,
}

impl TxSessionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        TxSessionBuilder {
            interface: None,
            duc_channel: None,
            tx_channel: None,
            rate_index: None,
            udp_port: None,
            stream_id: None,
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            ring_capacity: DEFAULT_RING_CAPACITY,
            reserve: DEFAULT_RESERVE,
            trigger_mode: TriggerMode::default(),
            status_port: None,
            destination: None,
            command_addr: None,
            command_session: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Network interface the radio is attached to.
    pub fn interface(mut self, name: &str) -> Self {
        self.interface = Some(name.to_string());
        self
    }

    /// DUC within the TX channel.
    pub fn duc_channel(mut self, channel: u8) -> Self {
        self.duc_channel = Some(channel);
        self
    }

    /// TX channel.
    pub fn tx_channel(mut self, channel: u8) -> Self {
        self.tx_channel = Some(channel);
        self
    }

    /// DUC rate index (see [`RateTable`]).
    pub fn rate_index(mut self, index: u8) -> Self {
        self.rate_index = Some(index);
        self
    }

    /// UDP port the radio receives transmit frames on.
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = Some(port);
        self
    }

    /// Stream id written into frames and assigned to the TX channel
    /// (default: 0, not assigned).
    pub fn stream_id(mut self, id: u32) -> Self {
        self.stream_id = Some(id);
        self
    }

    /// Samples per frame (default: 1024).
    pub fn samples_per_frame(mut self, n: usize) -> Self {
        self.samples_per_frame = n;
        self
    }

    /// DUC ring-buffer capacity in samples (default: 67108862).
    pub fn ring_capacity(mut self, samples: i64) -> Self {
        self.ring_capacity = samples;
        self
    }

    /// Credit held back from the ring buffer (default: 0).
    pub fn reserve(mut self, samples: i64) -> Self {
        self.reserve = samples;
        self
    }

    /// Which threshold status reports update credit (default: on fill).
    pub fn trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Port status reports arrive on (default: 42810 + TX channel).
    pub fn status_port(mut self, port: u16) -> Self {
        self.status_port = Some(port);
        self
    }

    /// Send frames here instead of the interface broadcast address.
    pub fn destination(mut self, addr: SocketAddr) -> Self {
        self.destination = Some(addr);
        self
    }

    /// Address of the radio's TCP command port.
    pub fn command_addr(mut self, addr: &str) -> Self {
        self.command_addr = Some(addr.to_string());
        self
    }

    /// Use an existing command session instead of connecting one.
    pub fn command_session(mut self, session: Arc<dyn CommandSession>) -> Self {
        self.command_session = Some(session);
        self
    }

    /// Command reply timeout (default: 1000ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Samples sent before the DUC is unpaused.
    ///
    /// This is the smallest whole number of frames covering half the ring
    /// capacity, kept within the usable credit. Rounding up is what turns
    /// the default 67108862-sample ring into a 33554432-sample prefill with
    /// 1024-sample frames; rounding half of it down would give 33553408.
    pub fn prefill_target(&self) -> i64 {
        let frame = self.samples_per_frame.max(1) as i64;
        let half = self.ring_capacity / 2;
        let target = (half + frame - 1) / frame * frame;
        let usable = (self.ring_capacity - self.reserve) / frame * frame;
        target.min(usable).max(0)
    }

    fn validate(&self, needs_command_addr: bool) -> Result<Validated> {
        let mut err = ConfigError::new();

        if self.interface.is_none() {
            err.missing("interface");
        }
        if self.duc_channel.is_none() {
            err.missing("duc_channel");
        }
        if self.rate_index.is_none() {
            err.missing("rate_index");
        }
        if self.tx_channel.is_none() {
            err.missing("tx_channel");
        }
        if self.udp_port.is_none() {
            err.missing("udp_port");
        }
        if needs_command_addr && self.command_session.is_none() && self.command_addr.is_none() {
            err.missing("command_addr");
        }

        if let Some(index) = self.rate_index {
            if RateTable::sample_rate(index).is_none() {
                err.invalid(format!("unknown rate index {}", index));
            }
        }
        if self.samples_per_frame == 0 {
            err.invalid("samples per frame must be nonzero");
        }
        if self.reserve < 0 || self.reserve >= self.ring_capacity {
            err.invalid(format!(
                "reserve {} must be within 0..{}",
                self.reserve, self.ring_capacity
            ));
        } else if self.ring_capacity - self.reserve < self.samples_per_frame as i64 {
            err.invalid("ring capacity is smaller than one frame");
        }

        match (
            &self.interface,
            self.duc_channel,
            self.rate_index,
            self.tx_channel,
            self.udp_port,
        ) {
            (Some(interface), Some(duc_channel), Some(rate_index), Some(tx_channel), Some(udp_port))
                if err.is_empty() =>
            {
                Ok(Validated {
                    interface: interface.clone(),
                    duc_channel,
                    rate_index,
                    tx_channel,
                    udp_port,
                })
            }
            _ => Err(err.into()),
        }
    }

    /// Connect the command session, open the sockets and start the session.
    ///
    /// Requires [`command_addr`](Self::command_addr) or
    /// [`command_session`](Self::command_session) in addition to the
    /// required settings.
    pub async fn start(self) -> Result<TxSession> {
        let cfg = self.validate(true)?;

        let commands: Arc<dyn CommandSession> = match (&self.command_session, &self.command_addr) {
            (Some(session), _) => Arc::clone(session),
            (None, Some(addr)) => {
                Arc::new(TcpCommandSession::connect_with_timeout(addr, self.command_timeout).await?)
            }
            (None, None) => {
                let mut err = ConfigError::new();
                err.missing("command_addr");
                return Err(err.into());
            }
        };

        let status_port = self.status_port.unwrap_or_else(|| status_port(cfg.tx_channel));
        let status = UdpTransport::bind_port(status_port).await?;

        let packetizer = TxPacketizer::start(&self.packetizer_config(&cfg)).await?;

        self.launch(cfg, commands, packetizer, Box::new(status)).await
    }

    /// Start the session over pre-opened endpoints.
    ///
    /// This is the entry point for testing with the harness mocks.
    pub async fn start_with(self, links: TxLinks) -> Result<TxSession> {
        let cfg = self.validate(false)?;
        let packetizer = TxPacketizer::with_sink(links.sink, &self.packetizer_config(&cfg))?;
        self.launch(cfg, links.commands, packetizer, links.status).await
    }

    fn packetizer_config(&self, cfg: &Validated) -> PacketizerConfig {
        PacketizerConfig {
            interface: cfg.interface.clone(),
            port: cfg.udp_port,
            destination: self.destination,
            stream_id: self.stream_id.unwrap_or_default(),
            samples_per_frame: self.samples_per_frame,
            rate_index: cfg.rate_index,
        }
    }

    async fn launch(
        self,
        cfg: Validated,
        commands: Arc<dyn CommandSession>,
        packetizer: TxPacketizer,
        status: Box<dyn DatagramSource>,
    ) -> Result<TxSession> {
        let duc = DucControl::new(commands, cfg.tx_channel, cfg.duc_channel, self.command_timeout);
        duc.set_paused(true).await?;
        duc.set_rate_index(cfg.rate_index).await?;
        if let Some(id) = self.stream_id {
            duc.set_stream_id(id).await?;
        }

        let flow = TxFlowController::with_source(
            status,
            self.ring_capacity,
            self.reserve,
            self.trigger_mode,
        )?;
        let prefill_target = self.prefill_target();

        tracing::info!(
            interface = %cfg.interface,
            tx_channel = cfg.tx_channel,
            duc_channel = cfg.duc_channel,
            rate_index = cfg.rate_index,
            prefill_target,
            "TX session started"
        );

        Ok(TxSession::new(duc, packetizer, flow, cfg.rate_index, prefill_target))
    }
}

impl Default for TxSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Required settings, present.
struct Validated {
    interface: String,
    duc_channel: u8,
    rate_index: u8,
    tx_channel: u8,
    udp_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrtlink_core::error::Error;
    use vrtlink_core::types::TxState;
    use vrtlink_test_harness::{MockCommandSession, MockDatagramSink, MockDatagramSource};

    fn complete() -> TxSessionBuilder {
        TxSessionBuilder::new()
            .interface("eth0")
            .tx_channel(1)
            .duc_channel(0)
            .rate_index(9)
            .udp_port(42836)
    }

    fn links(radio: &MockCommandSession) -> TxLinks {
        let (status, _feed) = MockDatagramSource::new();
        TxLinks {
            commands: Arc::new(radio.clone()),
            sink: Box::new(MockDatagramSink::new()),
            status: Box::new(status),
        }
    }

    #[test]
    fn default_prefill_target() {
        assert_eq!(TxSessionBuilder::new().prefill_target(), 33_554_432);
    }

    #[test]
    fn prefill_target_is_frame_multiple() {
        let b = TxSessionBuilder::new()
            .ring_capacity(10_000)
            .samples_per_frame(300);
        assert_eq!(b.prefill_target() % 300, 0);
        assert_eq!(b.prefill_target(), 5_100);
    }

    #[test]
    fn prefill_target_rounds_up_to_cover_half() {
        let target = |capacity: i64, frame: usize| {
            TxSessionBuilder::new()
                .ring_capacity(capacity)
                .samples_per_frame(frame)
                .prefill_target()
        };
        assert_eq!(target(10_000, 250), 5_000);
        assert_eq!(target(10_000, 2_400), 7_200);
        assert_eq!(target(10_000, 256), 5_120);
        for (capacity, frame) in [(10_000, 300), (67_108_862, 1024), (4_097, 64)] {
            let t = target(capacity, frame);
            assert!(t >= capacity / 2, "{} / {}", capacity, frame);
            assert!(t - (frame as i64) < capacity / 2, "{} / {}", capacity, frame);
        }
    }

    #[test]
    fn prefill_target_respects_reserve() {
        let b = TxSessionBuilder::new()
            .ring_capacity(4_096)
            .reserve(3_000)
            .samples_per_frame(256);
        assert_eq!(b.prefill_target(), 1_024);
    }

    #[tokio::test]
    async fn missing_fields_reported_together() {
        let err = TxSessionBuilder::new()
            .tx_channel(0)
            .start()
            .await
            .unwrap_err();
        match err {
            Error::Config(c) => assert_eq!(
                c.missing,
                vec!["interface", "duc_channel", "rate_index", "udp_port", "command_addr"]
            ),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_rate_index_rejected() {
        let radio = MockCommandSession::new();
        let err = complete()
            .rate_index(13)
            .start_with(links(&radio))
            .await
            .unwrap_err();
        match err {
            Error::Config(c) => {
                assert!(c.missing.is_empty());
                assert_eq!(c.invalid, vec!["unknown rate index 13".to_string()]);
            }
            other => panic!("expected Config error, got {:?}", other),
        }
        assert!(radio.commands().is_empty());
    }

    #[tokio::test]
    async fn bad_reserve_rejected() {
        let radio = MockCommandSession::new();
        let err = complete()
            .ring_capacity(1_000)
            .reserve(1_000)
            .start_with(links(&radio))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn start_configures_duc() {
        let radio = MockCommandSession::new();
        let session = complete()
            .stream_id(0x8400_0001)
            .start_with(links(&radio))
            .await
            .unwrap();

        assert_eq!(session.state(), TxState::Prefilling);
        assert_eq!(
            radio.commands(),
            vec![
                "set tx/1/duc/0/pause 1",
                "get tx/1/duc/0/pause",
                "set tx/1/duc/0/rate 9",
                "get tx/1/duc/0/rate",
                "set tx/1/stream_id 2214592513",
                "get tx/1/stream_id",
            ]
        );
    }

    #[tokio::test]
    async fn command_failure_aborts_start() {
        let radio = MockCommandSession::new();
        radio.reject("tx/1/duc/0/rate");
        let err = complete().start_with(links(&radio)).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn start_over_loopback() {
        let radio = MockCommandSession::new();
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut session = complete()
            .command_session(Arc::new(radio.clone()))
            .destination(receiver.local_addr())
            .status_port(0)
            .samples_per_frame(32)
            .start()
            .await
            .unwrap();

        session.send_frame(&[0i16; 64]).await.unwrap();
        let mut buf = [0u8; 512];
        let n = receiver
            .recv(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, 32 + 32 * 4 + 4);
        session.stop().await;
    }
}
