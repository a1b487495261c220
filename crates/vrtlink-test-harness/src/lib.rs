//! vrtlink-test-harness: Mock transports for testing vrtlink stream engines.
//!
//! This crate provides [`MockDatagramSource`] and [`MockDatagramSink`] for
//! driving the RX ingestor, flow controller and packetizer with scripted
//! datagrams, and [`MockCommandSession`] standing in for the radio's
//! command port.

pub mod mock_command;
pub mod mock_datagram;

pub use mock_command::MockCommandSession;
pub use mock_datagram::{DatagramFeed, MockDatagramSink, MockDatagramSource};
