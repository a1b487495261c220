//! # vrtlink -- VITA-49 Streaming for SDR Hardware
//!
//! `vrtlink` is an asynchronous Rust library for moving I/Q samples between
//! a host and a family of software-defined radios over VITA-49 UDP links.
//! It keeps received sample timelines intact under packet loss and paces
//! transmit frames against the radio's DUC ring buffer.
//!
//! ## Quick Start
//!
//! Receive a framed DDC stream and watch for loss:
//!
//! ```no_run
//! use vrtlink::{FrameProfile, IqSample};
//! use vrtlink::stream::RxIngestorBuilder;
//!
//! #[tokio::main]
//! async fn main() -> vrtlink::Result<()> {
//!     let mut rx = RxIngestorBuilder::new(FrameProfile::framed(1536))
//!         .port(42820)
//!         .rate_index(9)
//!         .build()
//!         .await?;
//!
//!     let mut buf = vec![IqSample::ZERO; 8192];
//!     loop {
//!         let report = rx.fill(&mut buf).await?;
//!         for tag in &report.tags {
//!             println!("{:?}", tag);
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `vrtlink-core`         | Transport traits, types, events, errors          |
//! | `vrtlink-transport`    | UDP and TCP implementations of the traits        |
//! | `vrtlink-stream`       | Frame codec, RX ingestion, TX flow control       |
//! | `vrtlink-test-harness` | Mock datagram endpoints and command sessions     |
//! | **`vrtlink`**          | This facade crate -- re-exports everything       |
//!
//! ## Transmit
//!
//! [`TxSessionBuilder`](stream::TxSessionBuilder) validates the
//! configuration, pauses the DUC, and prefills half of its ring buffer
//! before unpausing. After that every frame waits for credit reported by
//! the radio:
//!
//! ```no_run
//! use vrtlink::stream::TxSessionBuilder;
//!
//! # async fn example() -> vrtlink::Result<()> {
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
//! let silence = vec![0i16; 2 * tx.samples_per_frame()];
//! for _ in 0..100_000 {
//!     tx.send_frame(&silence).await?;
//! }
//! tx.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Events
//!
//! Both directions publish [`StreamEvent`]s through broadcast channels:
//! dropped packets on receive; underruns, overruns, link loss and state
//! changes on transmit. Counters are also available from `stats()`.

pub use vrtlink_core::*;

/// Concrete UDP and TCP transports.
pub mod transport {
    pub use vrtlink_transport::*;
}

/// Frame codec and stream engines.
pub mod stream {
    pub use vrtlink_stream::*;
}
