//! Transmit flow control against the radio's DUC ring buffer.
//!
//! The radio reports free ring-buffer space in status datagrams (see
//! [`crate::status`]). [`TxFlowController`] runs a spawned task that decodes
//! them into a shared [`TxCredit`]; the sending side waits for credit with
//! [`block_until_available`](TxFlowController::block_until_available) and
//! charges what it sent with [`consumed`](TxFlowController::consumed).
//!
//! The credit is the only state shared between tasks. It sits behind one
//! `tokio::sync::Mutex` and waiters are woken through one `Notify` after
//! every report.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use vrtlink_core::error::{Error, Result};
use vrtlink_core::events::StreamEvent;
use vrtlink_core::transport::DatagramSource;
use vrtlink_core::types::TriggerMode;
use vrtlink_transport::UdpTransport;

use crate::rx::EVENT_CHANNEL_CAPACITY;
use crate::status::{STATUS_SIZE, StatusReport};

/// Transmit credit, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxCredit {
    /// Samples that may be sent without overfilling the ring buffer.
    pub free_space: i64,
    /// Ring-buffer capacity.
    pub max_free_space: i64,
    /// Headroom kept free at all times.
    pub reserve: i64,
    /// Highest underrun count reported.
    pub underrun_count: u64,
    /// Highest overrun count reported.
    pub overrun_count: u64,
    /// Highest packet-loss count reported.
    pub loss_count: u64,
    /// Empty flag from the last report.
    pub empty: bool,
    /// Full flag from the last report.
    pub full: bool,
    /// Which threshold reports update `free_space`.
    pub trigger_mode: TriggerMode,
    /// Status reports processed.
    pub reports: u64,
    /// Set once the controller stops; waiters fail from then on.
    pub closed: bool,
}

impl TxCredit {
    /// Credit for an empty ring buffer.
    pub fn new(max_free_space: i64, reserve: i64, trigger_mode: TriggerMode) -> Self {
        TxCredit {
            free_space: max_free_space - reserve,
            max_free_space,
            reserve,
            underrun_count: 0,
            overrun_count: 0,
            loss_count: 0,
            empty: false,
            full: false,
            trigger_mode,
            reports: 0,
            closed: false,
        }
    }

    /// Upper bound of `free_space`.
    pub fn ceiling(&self) -> i64 {
        self.max_free_space - self.reserve
    }

    /// Fold one status report into the credit.
    ///
    /// Returns the events for counters that increased.
    pub fn apply(&mut self, report: &StatusReport) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.reports += 1;

        if raise(&mut self.underrun_count, report.underrun_count) {
            events.push(StreamEvent::Underrun {
                total: self.underrun_count,
            });
        }
        if raise(&mut self.overrun_count, report.overrun_count) {
            events.push(StreamEvent::Overrun {
                total: self.overrun_count,
            });
        }
        if raise(&mut self.loss_count, report.loss_count) {
            events.push(StreamEvent::PacketLoss {
                total: self.loss_count,
            });
        }
        self.empty = report.empty();
        self.full = report.full();

        if report.accepted_by(self.trigger_mode) {
            let reported = i64::try_from(report.free_space).unwrap_or(i64::MAX);
            self.free_space = self.ceiling().min(reported.saturating_sub(self.reserve));
        }

        events
    }
}

/// Raise a monotonic counter; true if it grew.
fn raise(counter: &mut u64, reported: u32) -> bool {
    let reported = reported as u64;
    if reported > *counter {
        *counter = reported;
        true
    } else {
        false
    }
}

struct Shared {
    credit: Mutex<TxCredit>,
    notify: Notify,
}

impl Shared {
    async fn close(&self) {
        self.credit.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}

/// Paces transmission against status reports from the radio.
pub struct TxFlowController {
    shared: Arc<Shared>,
    event_tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TxFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxFlowController")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TxFlowController {
    /// Listen for status reports on `port` (all interfaces).
    pub async fn start(
        port: u16,
        max_free_space: i64,
        reserve: i64,
        trigger_mode: TriggerMode,
    ) -> Result<Self> {
        let transport = UdpTransport::bind_port(port).await?;
        debug!(local = %transport.local_addr(), "Flow-control listener bound");
        Self::with_source(Box::new(transport), max_free_space, reserve, trigger_mode)
    }

    /// Run the controller over a caller-provided datagram source.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] unless `0 <= reserve < max_free_space`.
    pub fn with_source(
        source: Box<dyn DatagramSource>,
        max_free_space: i64,
        reserve: i64,
        trigger_mode: TriggerMode,
    ) -> Result<Self> {
        if reserve < 0 || reserve >= max_free_space {
            return Err(Error::InvalidParameter(format!(
                "reserve {} must be within 0..{}",
                reserve, max_free_space
            )));
        }

        let shared = Arc::new(Shared {
            credit: Mutex::new(TxCredit::new(max_free_space, reserve, trigger_mode)),
            notify: Notify::new(),
        });
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(status_loop(
            source,
            Arc::clone(&shared),
            event_tx.clone(),
            cancel.clone(),
        ));

        debug!(max_free_space, reserve, ?trigger_mode, "Flow controller started");

        Ok(TxFlowController {
            shared,
            event_tx,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Wait until at least `n` samples of credit are free.
    ///
    /// There is no timeout. The free space is checked under the credit lock,
    /// so the call never returns with less than `n` available.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamClosed`] once the controller is stopped.
    /// - [`Error::InvalidParameter`] if `n` exceeds what the ring buffer can
    ///   ever offer.
    pub async fn block_until_available(&self, n: u32) -> Result<()> {
        let n = i64::from(n);
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let credit = self.shared.credit.lock().await;
                if credit.closed {
                    return Err(Error::StreamClosed);
                }
                if n > credit.ceiling() {
                    return Err(Error::InvalidParameter(format!(
                        "{} samples exceeds the usable ring capacity {}",
                        n,
                        credit.ceiling()
                    )));
                }
                if credit.free_space >= n {
                    return Ok(());
                }
                trace!(needed = n, free = credit.free_space, "Waiting for credit");
            }

            notified.await;
        }
    }

    /// Charge `n` samples against the credit.
    pub async fn consumed(&self, n: u32) {
        let mut credit = self.shared.credit.lock().await;
        credit.free_space -= i64::from(n);
    }

    /// Whether `n` samples could be sent now.
    pub async fn ok_to_send(&self, n: u32) -> bool {
        let credit = self.shared.credit.lock().await;
        !credit.closed && credit.free_space >= i64::from(n)
    }

    /// Whether the controller has stopped, by request or because its
    /// status source ended.
    pub async fn is_closed(&self) -> bool {
        self.shared.credit.lock().await.closed
    }

    /// Snapshot of the credit.
    pub async fn credit(&self) -> TxCredit {
        *self.shared.credit.lock().await
    }

    /// Subscribe to underrun, overrun and loss events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// The event sender, for components that publish on the same channel.
    pub(crate) fn event_sender(&self) -> broadcast::Sender<StreamEvent> {
        self.event_tx.clone()
    }

    /// Stop the status task and fail all current and future waiters.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        self.shared.close().await;
        debug!("Flow controller stopped");
    }
}

impl Drop for TxFlowController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Receive status datagrams until cancelled or the source ends.
///
/// Other receive errors are logged and skipped.
async fn status_loop(
    mut source: Box<dyn DatagramSource>,
    shared: Arc<Shared>,
    event_tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; STATUS_SIZE * 2];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Status task cancelled");
                break;
            }

            received = source.recv_datagram(&mut buf) => {
                let n = match received {
                    Ok(n) => n,
                    Err(Error::StreamClosed) => {
                        debug!("Status source closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Status receive failed, continuing");
                        continue;
                    }
                };

                let report = match StatusReport::decode(&buf[..n]) {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(error = %e, bytes = n, "Ignoring malformed status datagram");
                        continue;
                    }
                };

                let events = {
                    let mut credit = shared.credit.lock().await;
                    let events = credit.apply(&report);
                    trace!(
                        free = credit.free_space,
                        reported = report.free_space,
                        flags = format_args!("{:#x}", report.flags),
                        "Status report applied"
                    );
                    events
                };
                shared.notify.notify_waiters();

                for event in events {
                    warn!(?event, "Radio reported transmit fault");
                    let _ = event_tx.send(event);
                }
            }
        }
    }

    shared.close().await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
