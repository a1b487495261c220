//! Transmit session: prefill, streaming and pause.
//!
//! ```text
//! Stopped --start--> Prefilling --target reached--> Streaming <--pause/resume--> Paused
//!    ^                                                   |                         |
//!    +------------------------- stop -------------------+-------------------------+
//! ```
//!
//! While prefilling, the DUC is held paused and frames go out without
//! waiting for credit until half the ring buffer is full; then the DUC is
//! unpaused. From there every frame waits for credit first.
//!
//! Sessions are created by [`TxSessionBuilder`](crate::builder::TxSessionBuilder).

use std::sync::Arc;

use tokio::sync::broadcast;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::events::StreamEvent;
use vrtlink_core::rate::RateTable;
use vrtlink_core::types::TxState;

use crate::commands::DucControl;
use crate::flow::{TxCredit, TxFlowController};
use crate::packetizer::{TxPacketizer, TxStats};

/// Snapshot of a session's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSessionStats {
    /// Current state.
    pub state: TxState,
    /// Samples sent while prefilling.
    pub prefilled: i64,
    /// Samples to send before unpausing the DUC.
    pub prefill_target: i64,
    /// Packetizer counters.
    pub packets: TxStats,
    /// Flow-control credit; `None` once stopped.
    pub credit: Option<TxCredit>,
}

/// Stops a session from another task.
///
/// A frame blocked on credit returns [`Error::StreamClosed`] and the
/// session moves to [`TxState::Stopped`].
#[derive(Debug, Clone)]
pub struct TxStopHandle {
    flow: Arc<TxFlowController>,
}

impl TxStopHandle {
    /// Stop the flow controller, failing any pending wait.
    pub async fn stop(&self) {
        self.flow.stop().await;
    }
}

struct Links {
    packetizer: TxPacketizer,
    flow: Arc<TxFlowController>,
}

/// A running transmit stream.
pub struct TxSession {
    duc: DucControl,
    links: Option<Links>,
    state: TxState,
    rate_index: u8,
    samples_per_frame: usize,
    prefill_target: i64,
    prefilled: i64,
    last_stats: TxStats,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl std::fmt::Debug for TxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSession")
            .field("duc", &self.duc)
            .field("state", &self.state)
            .field("rate_index", &self.rate_index)
            .field("prefill_target", &self.prefill_target)
            .field("prefilled", &self.prefilled)
            .finish_non_exhaustive()
    }
}

impl TxSession {
    /// Assemble a session whose DUC is already paused at `rate_index`.
    pub(crate) fn new(
        duc: DucControl,
        packetizer: TxPacketizer,
        flow: TxFlowController,
        rate_index: u8,
        prefill_target: i64,
    ) -> Self {
        let event_tx = flow.event_sender();
        let samples_per_frame = packetizer.samples_per_frame();
        let mut session = TxSession {
            duc,
            links: Some(Links {
                packetizer,
                flow: Arc::new(flow),
            }),
            state: TxState::Stopped,
            rate_index,
            samples_per_frame,
            prefill_target,
            prefilled: 0,
            last_stats: TxStats::default(),
            event_tx,
        };
        session.transition(TxState::Prefilling);
        session
    }

    fn transition(&mut self, to: TxState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, "TX state change");
        let _ = self.event_tx.send(StreamEvent::TxStateChanged { from, to });
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Sample rate of the configured rate index.
    pub fn sample_rate(&self) -> u32 {
        RateTable::sample_rate(self.rate_index).unwrap_or_default()
    }

    /// Configured rate index.
    pub fn rate_index(&self) -> u8 {
        self.rate_index
    }

    /// Samples per frame expected by [`send_frame`](Self::send_frame).
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Samples sent before the DUC is unpaused.
    pub fn prefill_target(&self) -> i64 {
        self.prefill_target
    }

    /// Subscribe to state changes and radio fault reports.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// A handle that stops this session from another task.
    pub fn stop_handle(&self) -> Option<TxStopHandle> {
        self.links.as_ref().map(|l| TxStopHandle {
            flow: Arc::clone(&l.flow),
        })
    }

    /// Progress snapshot.
    pub async fn stats(&self) -> TxSessionStats {
        let (packets, credit) = match &self.links {
            Some(links) => (links.packetizer.stats(), Some(links.flow.credit().await)),
            None => (self.last_stats, None),
        };
        TxSessionStats {
            state: self.state,
            prefilled: self.prefilled,
            prefill_target: self.prefill_target,
            packets,
            credit,
        }
    }

    /// Send one frame of interleaved I/Q samples.
    ///
    /// Prefilling sends without waiting and unpauses the DUC once the
    /// target is reached. Streaming and Paused wait for credit first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] when stopped.
    /// - [`Error::InvalidParameter`] unless `samples` holds exactly one
    ///   frame. Nothing waits and nothing is sent.
    /// - [`Error::StreamClosed`] if flow control was stopped, before or
    ///   while waiting; the session is then [`TxState::Stopped`] and the
    ///   DUC stays paused if it was still prefilling.
    /// - Packetizer and command errors as returned.
    pub async fn send_frame(&mut self, samples: &[i16]) -> Result<()> {
        let state = self.state;
        let Some(links) = self.links.as_mut() else {
            return Err(Error::NotConnected);
        };
        if samples.len() != 2 * self.samples_per_frame {
            return Err(Error::InvalidParameter(format!(
                "frame needs {} interleaved values, got {}",
                2 * self.samples_per_frame,
                samples.len()
            )));
        }
        // Bounded by the frame's 16-bit packet size.
        let n = self.samples_per_frame as u32;

        match state {
            TxState::Stopped => return Err(Error::NotConnected),
            TxState::Prefilling => {
                if links.flow.is_closed().await {
                    tracing::warn!("Flow control stopped during prefill");
                    self.teardown();
                    return Err(Error::StreamClosed);
                }
                links.packetizer.send(samples).await?;
                links.flow.consumed(n).await;
                self.prefilled += i64::from(n);
                if self.prefilled >= self.prefill_target {
                    tracing::info!(
                        prefilled = self.prefilled,
                        target = self.prefill_target,
                        "Prefill complete, unpausing DUC"
                    );
                    self.duc.set_paused(false).await?;
                    self.transition(TxState::Streaming);
                }
            }
            TxState::Streaming | TxState::Paused => {
                if let Err(e) = links.flow.block_until_available(n).await {
                    if matches!(e, Error::StreamClosed) {
                        self.teardown();
                    }
                    return Err(e);
                }
                links.packetizer.send(samples).await?;
                links.flow.consumed(n).await;
            }
        }
        Ok(())
    }

    /// Pause the DUC. Sockets stay open.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when stopped, [`Error::InvalidParameter`]
    /// during prefill (the DUC is already held paused).
    pub async fn pause(&mut self) -> Result<()> {
        match self.state {
            TxState::Stopped => Err(Error::NotConnected),
            TxState::Prefilling => Err(Error::InvalidParameter(
                "cannot pause during prefill".into(),
            )),
            TxState::Paused => Ok(()),
            TxState::Streaming => {
                self.duc.set_paused(true).await?;
                self.transition(TxState::Paused);
                Ok(())
            }
        }
    }

    /// Unpause the DUC after [`pause`](Self::pause).
    pub async fn resume(&mut self) -> Result<()> {
        match self.state {
            TxState::Stopped => Err(Error::NotConnected),
            TxState::Prefilling => Err(Error::InvalidParameter(
                "cannot resume during prefill".into(),
            )),
            TxState::Streaming => Ok(()),
            TxState::Paused => {
                self.duc.set_paused(false).await?;
                self.transition(TxState::Streaming);
                Ok(())
            }
        }
    }

    /// Change the DUC rate. Counters and timestamp continue.
    pub async fn set_rate_index(&mut self, index: u8) -> Result<()> {
        let Some(links) = self.links.as_mut() else {
            return Err(Error::NotConnected);
        };
        if RateTable::sample_rate(index).is_none() {
            return Err(Error::InvalidParameter(format!("unknown rate index {}", index)));
        }
        self.duc.set_rate_index(index).await?;
        links.packetizer.set_rate_index(index)?;
        self.rate_index = index;
        Ok(())
    }

    /// Stop the flow controller, wake waiters and close the sockets.
    pub async fn stop(&mut self) {
        if let Some(links) = &self.links {
            links.flow.stop().await;
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(links) = self.links.take() {
            self.last_stats = links.packetizer.stats();
            // The status task is already cancelled; dropping the last Arc
            // closes its socket.
            drop(links);
        }
        self.prefilled = 0;
        self.transition(TxState::Stopped);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{TxLinks, TxSessionBuilder};
    use crate::status::{StatusReport, flags};
    use std::time::Duration;
    use vrtlink_test_harness::{
        DatagramFeed, MockCommandSession, MockDatagramSink, MockDatagramSource,
    };

    const SPF: usize = 64;

    struct Rig {
        session: TxSession,
        radio: MockCommandSession,
        sink: MockDatagramSink,
        feed: DatagramFeed,
    }

    async fn rig(ring_capacity: i64) -> Rig {
        let radio = MockCommandSession::new();
        let sink = MockDatagramSink::new();
        let (status, feed) = MockDatagramSource::new();
        let session = TxSessionBuilder::new()
            .interface("eth0")
            .tx_channel(0)
            .duc_channel(0)
            .rate_index(9)
            .udp_port(42836)
            .samples_per_frame(SPF)
            .ring_capacity(ring_capacity)
            .start_with(TxLinks {
                commands: Arc::new(radio.clone()),
                sink: Box::new(sink.clone()),
                status: Box::new(status),
            })
            .await
            .unwrap();
        Rig {
            session,
            radio,
            sink,
            feed,
        }
    }

    fn frame() -> Vec<i16> {
        vec![1; 2 * SPF]
    }

    fn periodic(free_space: u64) -> Vec<u8> {
        StatusReport {
            free_space,
            flags: flags::PERIODIC,
            ..Default::default()
        }
        .encode()
    }

    async fn drive_to_streaming(rig: &mut Rig) {
        let frames = rig.session.prefill_target() as usize / SPF;
        for _ in 0..frames {
            rig.session.send_frame(&frame()).await.unwrap();
        }
        assert_eq!(rig.session.state(), TxState::Streaming);
    }

    #[tokio::test]
    async fn start_pauses_duc_and_enters_prefill() {
        let rig = rig(1024).await;
        assert_eq!(rig.session.state(), TxState::Prefilling);
        assert_eq!(rig.session.sample_rate(), 200_000);
        assert_eq!(rig.session.prefill_target(), 512);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("1"));
        assert_eq!(rig.radio.value("tx/0/duc/0/rate").as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn prefill_then_stream() {
        let mut rig = rig(1024).await;
        let mut events = rig.session.subscribe();

        for i in 0..8 {
            assert_eq!(rig.session.state(), TxState::Prefilling, "frame {}", i);
            rig.session.send_frame(&frame()).await.unwrap();
        }
        assert_eq!(rig.session.state(), TxState::Streaming);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("0"));
        assert_eq!(rig.sink.sent_count(), 8);
        assert_eq!(
            events.try_recv().unwrap(),
            StreamEvent::TxStateChanged {
                from: TxState::Prefilling,
                to: TxState::Streaming,
            }
        );

        let stats = rig.session.stats().await;
        assert_eq!(stats.prefilled, 512);
        assert_eq!(stats.packets.frames_sent, 8);
        assert_eq!(stats.credit.unwrap().free_space, 512);
    }

    #[tokio::test]
    async fn streaming_waits_for_credit() {
        let mut rig = rig(1024).await;
        drive_to_streaming(&mut rig).await;

        // 512 samples of credit left: eight more frames go straight out.
        for _ in 0..8 {
            rig.session.send_frame(&frame()).await.unwrap();
        }
        assert_eq!(rig.sink.sent_count(), 16);

        let handle = {
            let feed = rig.feed.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                feed.push(periodic(256));
            })
        };
        tokio::time::timeout(Duration::from_secs(2), rig.session.send_frame(&frame()))
            .await
            .unwrap()
            .unwrap();
        handle.await.unwrap();

        assert_eq!(rig.sink.sent_count(), 17);
        let credit = rig.session.stats().await.credit.unwrap();
        assert_eq!(credit.free_space, 256 - SPF as i64);
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let mut rig = rig(1024).await;
        drive_to_streaming(&mut rig).await;

        rig.session.pause().await.unwrap();
        assert_eq!(rig.session.state(), TxState::Paused);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("1"));

        // Frames still go out against credit while paused.
        rig.session.send_frame(&frame()).await.unwrap();
        assert_eq!(rig.sink.sent_count(), 9);

        rig.session.pause().await.unwrap();
        rig.session.resume().await.unwrap();
        assert_eq!(rig.session.state(), TxState::Streaming);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn pause_rejected_during_prefill() {
        let mut rig = rig(1024).await;
        assert!(matches!(
            rig.session.pause().await,
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(rig.session.state(), TxState::Prefilling);
    }

    #[tokio::test]
    async fn stop_then_send_is_not_connected() {
        let mut rig = rig(1024).await;
        rig.session.send_frame(&frame()).await.unwrap();
        rig.session.stop().await;

        assert_eq!(rig.session.state(), TxState::Stopped);
        assert!(matches!(
            rig.session.send_frame(&frame()).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(rig.session.resume().await, Err(Error::NotConnected)));

        let stats = rig.session.stats().await;
        assert_eq!(stats.packets.frames_sent, 1);
        assert!(stats.credit.is_none());
    }

    #[tokio::test]
    async fn stop_handle_wakes_blocked_sender() {
        let mut rig = rig(1024).await;
        drive_to_streaming(&mut rig).await;
        for _ in 0..8 {
            rig.session.send_frame(&frame()).await.unwrap();
        }

        let stopper = rig.session.stop_handle().unwrap();
        let stop = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop().await;
        });

        let result =
            tokio::time::timeout(Duration::from_secs(2), rig.session.send_frame(&frame()))
                .await
                .unwrap();
        assert!(matches!(result, Err(Error::StreamClosed)));
        assert_eq!(rig.session.state(), TxState::Stopped);
        stop.await.unwrap();
    }

    #[tokio::test]
    async fn stop_during_prefill_keeps_duc_paused() {
        let mut rig = rig(1024).await;
        rig.session.send_frame(&frame()).await.unwrap();

        let stopper = rig.session.stop_handle().unwrap();
        stopper.stop().await;

        for _ in 0..8 {
            assert!(matches!(
                rig.session.send_frame(&frame()).await,
                Err(Error::StreamClosed | Error::NotConnected)
            ));
        }
        assert_eq!(rig.session.state(), TxState::Stopped);
        assert_eq!(rig.sink.sent_count(), 1);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn status_source_end_stops_prefill() {
        // 128 frames of prefill, far more than the loop below sends.
        let mut rig = rig(16_384).await;
        let stats_before = rig.session.stats().await;
        assert!(!stats_before.credit.unwrap().closed);

        drop(rig.feed);
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rig.session.send_frame(&frame()).await {
                    Err(Error::StreamClosed) => break,
                    Ok(()) => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected error: {:?}", e),
                }
                assert_eq!(rig.session.state(), TxState::Prefilling);
            }
        })
        .await;
        assert!(closed.is_ok());
        assert_eq!(rig.session.state(), TxState::Stopped);
        assert_eq!(rig.radio.value("tx/0/duc/0/pause").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn wrong_length_rejected_without_waiting() {
        let mut rig = rig(1024).await;
        drive_to_streaming(&mut rig).await;
        for _ in 0..8 {
            rig.session.send_frame(&frame()).await.unwrap();
        }
        // No credit left: a valid frame would block here.
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            rig.session.send_frame(&[0i16; 2 * SPF - 2]),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(rig.sink.sent_count(), 16);
        assert_eq!(rig.session.state(), TxState::Streaming);
    }

    #[tokio::test]
    async fn unpause_failure_keeps_prefilling() {
        let mut rig = rig(128).await;
        rig.radio.freeze("tx/0/duc/0/pause");

        let err = rig.session.send_frame(&frame()).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(rig.session.state(), TxState::Prefilling);
    }

    #[tokio::test]
    async fn rate_change_goes_through_radio() {
        let mut rig = rig(1024).await;
        rig.session.set_rate_index(12).await.unwrap();
        assert_eq!(rig.session.sample_rate(), 25_000);
        assert_eq!(rig.radio.value("tx/0/duc/0/rate").as_deref(), Some("12"));

        assert!(matches!(
            rig.session.set_rate_index(99).await,
            Err(Error::InvalidParameter(_))
        ));
    }
}
