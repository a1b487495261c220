//! Asynchronous stream event types.
//!
//! Events are emitted through a `tokio::sync::broadcast` channel by the RX
//! ingestor and the TX flow controller. Monitoring code subscribes to them
//! to observe loss and ring-buffer health without polling counters.

use crate::types::TxState;

/// An event emitted by a receive or transmit stream.
///
/// Delivery is best-effort through a bounded broadcast channel; a slow
/// subscriber may miss events, but the underlying counters remain
/// available from the component's `stats()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Packets were lost between two received packets and replaced with
    /// zero samples.
    PacketsDropped {
        /// Stream the loss was detected on (0 for headerless streams).
        stream_id: u32,
        /// Number of packets replaced with silence.
        count: u32,
        /// Absolute sample offset at which the synthesized gap begins.
        offset: u64,
    },

    /// The radio reported new transmit underruns.
    Underrun {
        /// Cumulative underrun count reported by the radio.
        total: u64,
    },

    /// The radio reported new transmit overruns.
    Overrun {
        /// Cumulative overrun count reported by the radio.
        total: u64,
    },

    /// The radio reported new packet loss on the transmit link.
    PacketLoss {
        /// Cumulative loss count reported by the radio.
        total: u64,
    },

    /// The transmit session changed state.
    TxStateChanged {
        /// Previous state.
        from: TxState,
        /// New state.
        to: TxState,
    },
}
