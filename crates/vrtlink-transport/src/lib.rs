//! Transport implementations for vrtlink.
//!
//! This crate provides the concrete sockets behind the traits in
//! `vrtlink-core`:
//!
//! - [`UdpTransport`]: UDP datagrams for RX sample streams, TX flow-control
//!   status, and broadcast TX sample frames
//!   ([`DatagramSource`](vrtlink_core::DatagramSource) and
//!   [`DatagramSink`](vrtlink_core::DatagramSink))
//! - [`TcpCommandSession`]: the radio's line-oriented command port
//!   ([`CommandSession`](vrtlink_core::CommandSession))
//!
//! # Example
//!
//! ```no_run
//! use vrtlink_transport::UdpTransport;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! // Broadcast TX frames on eth1 to the radio's DUC port
//! let transport = UdpTransport::bind_interface_broadcast("eth1", 42836).await?;
//! println!("sending to {:?}", transport.destination());
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpCommandSession;
pub use udp::{InterfaceAddr, UdpTransport, resolve_interface};
