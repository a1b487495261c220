//! vrtlink-core: Core traits, types, and error definitions for vrtlink.
//!
//! This crate defines the transport-agnostic pieces every vrtlink crate
//! shares. Applications that only inspect decoded streams can depend on
//! these types without pulling in any socket code.
//!
//! # Key types
//!
//! - [`FrameProfile`] / [`ProfileKind`] -- wire layout of a stream
//! - [`IqSample`] -- one 16-bit complex sample
//! - [`RateTable`] -- rate index to sample rate
//! - [`DatagramSource`], [`DatagramSink`], [`CommandSession`] -- transport seams
//! - [`StreamEvent`] -- loss and ring-buffer notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod rate;
pub mod transport;
pub mod types;

pub use error::{CodecError, ConfigError, Error, Result, RxError};
pub use events::StreamEvent;
pub use rate::{DAC_RATE, RateTable};
pub use transport::{CommandSession, DatagramSink, DatagramSource};
pub use types::*;
