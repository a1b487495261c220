//! VITA-49 stream engines for vrtlink.
//!
//! This crate carries everything between the sockets and the sample
//! buffers:
//!
//! - **Frame codec** ([`vita49`]) -- decode the `Raw`, `Framed` and `Lean`
//!   receive profiles and build the transmit frame template.
//! - **Status reports** ([`status`]) -- the flow-control context packets the
//!   radio sends for each DUC ring buffer.
//! - **DDC metadata** ([`metadata`]) -- per-frame timestamps and DDC
//!   context words attached to received samples.
//! - **RX ingestion** ([`rx`]) -- [`RxIngestor`], which keeps the sample
//!   timeline intact under packet loss by inserting silence.
//! - **Flow control** ([`flow`]) -- [`TxFlowController`], which tracks
//!   ring-buffer credit from status reports.
//! - **Packetizer** ([`packetizer`]) -- [`TxPacketizer`], zero-copy framing
//!   with advancing counters and timestamps.
//! - **Radio commands** ([`commands`]) -- verified register writes for DUC
//!   pause, rate and stream id.
//! - **TX session** ([`session`], [`builder`]) -- [`TxSession`], the
//!   prefill/streaming/pause state machine, and [`TxSessionBuilder`].
//!
//! # Architecture
//!
//! Receive and transmit are independent. The ingestor and packetizer are
//! single-owner (`&mut self`) and run on the caller's task. The flow
//! controller runs its own task and shares only the credit with the
//! sender, behind one mutex and one `Notify`.

pub mod builder;
pub mod commands;
pub mod flow;
pub mod metadata;
pub mod packetizer;
pub mod rx;
pub mod session;
pub mod status;
pub mod vita49;

pub use builder::{TxLinks, TxSessionBuilder};
pub use flow::{TxCredit, TxFlowController};
pub use metadata::{DdcContext, DdcMetadata, OversampleRatio};
pub use packetizer::{PacketizerConfig, TxPacketizer, TxStats};
pub use rx::{
    FillReport, LossWindow, RxBlock, RxIngestor, RxIngestorBuilder, RxState, RxStats, SampleTag,
    TagKind,
};
pub use session::{TxSession, TxSessionStats, TxStopHandle};
pub use status::StatusReport;
pub use vita49::{DecodedPacket, FrameCodec, TxFrameTemplate};
