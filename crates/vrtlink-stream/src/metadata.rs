//! DDC status metadata carried by received frames.
//!
//! Every frame with a VITA header carries a stream id and timestamps. Lean
//! frames add five context words describing the DDC that produced them:
//!
//! ```text
//! ctx0  rx channel (31..24) | filter code (23..16) | oversample (15..8) | attenuation (7..0)
//! ctx1  tuned frequency, Hz
//! ctx2  DDC offset, Hz (signed)
//! ctx3  delay enable (31) | delay time (30..0)
//! ctx4  AGC gain (31..16) | valid samples (15..0)
//! ```

use std::fmt;

use vrtlink_core::rate::RateTable;

use crate::vita49::{CONTEXT_WORDS, DecodedPacket};

/// DDC oversampling ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OversampleRatio {
    /// No oversampling.
    X1,
    /// 2x.
    X2,
    /// 4x.
    X4,
    /// 8x.
    X8,
    /// 16x.
    X16,
    /// A code outside 0..=4.
    Unknown(u8),
}

impl OversampleRatio {
    /// Map the wire code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => OversampleRatio::X1,
            1 => OversampleRatio::X2,
            2 => OversampleRatio::X4,
            3 => OversampleRatio::X8,
            4 => OversampleRatio::X16,
            other => OversampleRatio::Unknown(other),
        }
    }

    /// The wire code.
    pub fn code(self) -> u8 {
        match self {
            OversampleRatio::X1 => 0,
            OversampleRatio::X2 => 1,
            OversampleRatio::X4 => 2,
            OversampleRatio::X8 => 3,
            OversampleRatio::X16 => 4,
            OversampleRatio::Unknown(c) => c,
        }
    }

    /// The multiplier, if known.
    pub fn factor(self) -> Option<u32> {
        match self {
            OversampleRatio::Unknown(_) => None,
            known => Some(1 << known.code()),
        }
    }
}

impl fmt::Display for OversampleRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.factor() {
            Some(n) => write!(f, "{}X", n),
            None => f.write_str("unknown"),
        }
    }
}

/// Decoded DDC context words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdcContext {
    /// Receiver channel.
    pub rx_channel: u8,
    /// Tuned frequency in hertz.
    pub tuned_frequency: u32,
    /// DDC offset from the tuned frequency in hertz.
    pub ddc_offset: i32,
    /// DDC filter (rate index) code.
    pub filter_code: u8,
    /// Sample rate selected by `filter_code`, if it is a valid index.
    pub sample_rate: Option<u32>,
    /// Whether the output delay is enabled.
    pub delay_enabled: bool,
    /// Output delay in samples.
    pub delay_time: u32,
    /// Oversampling ratio.
    pub oversample: OversampleRatio,
    /// AGC gain.
    pub agc_gain: u16,
    /// Valid samples in the frame.
    pub valid_samples: u16,
    /// Front-end attenuation in dB.
    pub attenuation: u8,
}

impl DdcContext {
    /// Decode the five context words.
    pub fn from_words(ctx: &[u32; CONTEXT_WORDS]) -> Self {
        let filter_code = ((ctx[0] >> 16) & 0xFF) as u8;
        DdcContext {
            rx_channel: (ctx[0] >> 24) as u8,
            tuned_frequency: ctx[1],
            ddc_offset: ctx[2] as i32,
            filter_code,
            sample_rate: RateTable::sample_rate(filter_code),
            delay_enabled: ctx[3] >> 31 == 1,
            delay_time: ctx[3] & 0x7FFF_FFFF,
            oversample: OversampleRatio::from_code(((ctx[0] >> 8) & 0xFF) as u8),
            agc_gain: (ctx[4] >> 16) as u16,
            valid_samples: (ctx[4] & 0xFFFF) as u16,
            attenuation: (ctx[0] & 0xFF) as u8,
        }
    }

    /// Encode into context words. `sample_rate` is derived and not stored.
    pub fn to_words(&self) -> [u32; CONTEXT_WORDS] {
        [
            ((self.rx_channel as u32) << 24)
                | ((self.filter_code as u32) << 16)
                | ((self.oversample.code() as u32) << 8)
                | self.attenuation as u32,
            self.tuned_frequency,
            self.ddc_offset as u32,
            ((self.delay_enabled as u32) << 31) | (self.delay_time & 0x7FFF_FFFF),
            ((self.agc_gain as u32) << 16) | self.valid_samples as u32,
        ]
    }
}

/// Per-frame metadata attached to received sample blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdcMetadata {
    /// Stream identifier.
    pub stream_id: u32,
    /// Integer timestamp.
    pub timestamp_int: Option<u32>,
    /// Fractional timestamp.
    pub timestamp_frac: Option<u64>,
    /// DDC context, present for Lean frames.
    pub context: Option<DdcContext>,
}

impl DdcMetadata {
    /// Extract metadata from a frame decoded with a VITA header.
    pub fn from_packet(packet: &DecodedPacket) -> Self {
        DdcMetadata {
            stream_id: packet.stream_id,
            timestamp_int: packet.timestamp_int,
            timestamp_frac: packet.timestamp_frac,
            context: packet.context.as_ref().map(DdcContext::from_words),
        }
    }
}
