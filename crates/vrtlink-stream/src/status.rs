//! Transmit flow-control status datagrams.
//!
//! The radio reports the state of each DUC ring buffer in a small VITA-49
//! context packet sent to `FLOW_CONTROL_BASE_PORT + tx_channel`:
//!
//! ```text
//! word  0   VITA header (type 4, C=1, T=1, TSI=0, TSF=0)
//! word  1   stream id
//! word  2-3 class id (PCC 0x0001)
//! word  4   free space, high 32 bits
//! word  5   free space, low 32 bits
//! word  6   overrun count
//! word  7   underrun count
//! word  8   packet-loss count
//! word  9   flags
//! word 10   trailer
//! ```
//!
//! Reports are raised periodically and when the ring buffer crosses its
//! fill or empty threshold; the flags word says which.

use vrtlink_core::error::{CodecError, Error, Result};
use vrtlink_core::types::TriggerMode;

use crate::vita49::{
    ClassId, PACKET_TYPE_IF_CONTEXT, RADIO_OUI, TX_INFO_CLASS_CODE, VitaHeader, Words, put_word,
};

/// Status reports for TX channel `n` arrive on this port plus `n`.
pub const FLOW_CONTROL_BASE_PORT: u16 = 42810;

/// Packet class code of status reports.
pub const STATUS_PACKET_CLASS_CODE: u16 = 0x0001;

/// Size of a status datagram in bytes.
pub const STATUS_SIZE: usize = STATUS_WORDS * 4;

const STATUS_WORDS: usize = 11;

/// Flags word bits.
pub mod flags {
    /// The ring buffer overflowed.
    pub const OVERRUN: u32 = 1 << 0;
    /// The ring buffer ran dry.
    pub const UNDERRUN: u32 = 1 << 1;
    /// Frames were lost on the link.
    pub const LOSS: u32 = 1 << 2;
    /// The ring buffer is full.
    pub const FULL: u32 = 1 << 3;
    /// The ring buffer is empty.
    pub const EMPTY: u32 = 1 << 4;
    /// Raised by the periodic timer.
    pub const PERIODIC: u32 = 1 << 8;
    /// Raised by crossing the fill threshold.
    pub const FILL_THRESHOLD: u32 = 1 << 9;
    /// Raised by crossing the empty threshold.
    pub const EMPTY_THRESHOLD: u32 = 1 << 10;
}

/// Port on which status reports for `tx_channel` arrive.
pub fn status_port(tx_channel: u8) -> u16 {
    FLOW_CONTROL_BASE_PORT + tx_channel as u16
}

/// One decoded status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Stream the report describes.
    pub stream_id: u32,
    /// Free ring-buffer space in samples.
    pub free_space: u64,
    /// Cumulative overrun count.
    pub overrun_count: u32,
    /// Cumulative underrun count.
    pub underrun_count: u32,
    /// Cumulative packet-loss count.
    pub loss_count: u32,
    /// Raw flags word (see [`flags`]).
    pub flags: u32,
}

impl StatusReport {
    /// Decode a status datagram (network word order).
    ///
    /// # Errors
    ///
    /// [`Error::Codec`] if the datagram is short, [`Error::Protocol`] if it
    /// is not a status context packet.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < STATUS_SIZE {
            return Err(CodecError::ShortBuffer {
                needed: STATUS_SIZE,
                actual: raw.len(),
            }
            .into());
        }
        let words = Words::new(raw, false);

        let header = VitaHeader::from_word(words.get(0)?);
        if header.packet_type != PACKET_TYPE_IF_CONTEXT || !header.has_class_id {
            return Err(Error::Protocol(format!(
                "not a status report: packet type {}, class id {}",
                header.packet_type, header.has_class_id
            )));
        }

        let class = ClassId::from_words(words.get(2)?, words.get(3)?);
        if class.oui != RADIO_OUI || class.pkt_class_code != STATUS_PACKET_CLASS_CODE {
            tracing::warn!(
                oui = format_args!("{:#08x}", class.oui),
                pcc = format_args!("{:#06x}", class.pkt_class_code),
                "Unexpected status report class"
            );
        }

        Ok(StatusReport {
            stream_id: words.get(1)?,
            free_space: ((words.get(4)? as u64) << 32) | words.get(5)? as u64,
            overrun_count: words.get(6)?,
            underrun_count: words.get(7)?,
            loss_count: words.get(8)?,
            flags: words.get(9)?,
        })
    }

    /// Encode as the radio would send it.
    pub fn encode(&self) -> Vec<u8> {
        let header = VitaHeader {
            packet_type: PACKET_TYPE_IF_CONTEXT,
            has_class_id: true,
            has_trailer: true,
            timestamp_int_type: 0,
            timestamp_frac_type: 0,
            packet_count: 0,
            packet_size: STATUS_WORDS as u16,
        };
        let class = ClassId {
            oui: RADIO_OUI,
            info_class_code: TX_INFO_CLASS_CODE,
            pkt_class_code: STATUS_PACKET_CLASS_CODE,
        }
        .to_words();

        let mut out = Vec::with_capacity(STATUS_SIZE);
        for w in [
            header.to_word(),
            self.stream_id,
            class[0],
            class[1],
            (self.free_space >> 32) as u32,
            self.free_space as u32,
            self.overrun_count,
            self.underrun_count,
            self.loss_count,
            self.flags,
            0,
        ] {
            put_word(&mut out, w, false);
        }
        out
    }

    fn flag(&self, bit: u32) -> bool {
        self.flags & bit != 0
    }

    /// The ring buffer overflowed.
    pub fn overrun(&self) -> bool {
        self.flag(flags::OVERRUN)
    }

    /// The ring buffer ran dry.
    pub fn underrun(&self) -> bool {
        self.flag(flags::UNDERRUN)
    }

    /// Frames were lost on the link.
    pub fn loss(&self) -> bool {
        self.flag(flags::LOSS)
    }

    /// The ring buffer is full.
    pub fn full(&self) -> bool {
        self.flag(flags::FULL)
    }

    /// The ring buffer is empty.
    pub fn empty(&self) -> bool {
        self.flag(flags::EMPTY)
    }

    /// Raised by the periodic timer.
    pub fn periodic(&self) -> bool {
        self.flag(flags::PERIODIC)
    }

    /// Raised by crossing the fill threshold.
    pub fn fill_threshold(&self) -> bool {
        self.flag(flags::FILL_THRESHOLD)
    }

    /// Raised by crossing the empty threshold.
    pub fn empty_threshold(&self) -> bool {
        self.flag(flags::EMPTY_THRESHOLD)
    }

    /// Whether the report's free space should update credit under `mode`.
    ///
    /// Periodic reports always apply; threshold reports apply when their
    /// threshold matches the mode.
    pub fn accepted_by(&self, mode: TriggerMode) -> bool {
        self.periodic()
            || match mode {
                TriggerMode::OnFill => self.fill_threshold(),
                TriggerMode::OnEmpty => self.empty_threshold(),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(flags: u32) -> StatusReport {
        StatusReport {
            stream_id: 0x8000_0001,
            free_space: 0x1_0000_0010,
            overrun_count: 1,
            underrun_count: 2,
            loss_count: 3,
            flags,
        }
    }

    #[test]
    fn port_convention() {
        assert_eq!(status_port(0), 42810);
        assert_eq!(status_port(3), 42813);
    }

    #[test]
    fn wire_layout() {
        let raw = report(flags::PERIODIC | flags::UNDERRUN).encode();
        assert_eq!(raw.len(), 44);
        // type 4, C=1, T=1, 11 words
        assert_eq!(&raw[0..4], &[0x4C, 0x00, 0x00, 0x0B]);
        assert_eq!(&raw[16..24], &[0, 0, 0, 1, 0, 0, 0, 0x10]);
        assert_eq!(&raw[36..40], &[0, 0, 0x01, 0x02]);
    }

    #[test]
    fn decode_recovers_fields() {
        let r = report(flags::FULL | flags::FILL_THRESHOLD);
        let d = StatusReport::decode(&r.encode()).unwrap();
        assert_eq!(d, r);
        assert!(d.full());
        assert!(d.fill_threshold());
        assert!(!d.empty());
        assert!(!d.periodic());
    }

    #[test]
    fn short_datagram() {
        let raw = report(0).encode();
        let err = StatusReport::decode(&raw[..40]).unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::ShortBuffer {
                needed: 44,
                actual: 40
            })
        ));
    }

    #[test]
    fn rejects_data_packets() {
        let mut raw = report(0).encode();
        raw[0] = 0x18;
        assert!(matches!(
            StatusReport::decode(&raw),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn trigger_acceptance() {
        let periodic = report(flags::PERIODIC);
        assert!(periodic.accepted_by(TriggerMode::OnFill));
        assert!(periodic.accepted_by(TriggerMode::OnEmpty));

        let fill = report(flags::FILL_THRESHOLD);
        assert!(fill.accepted_by(TriggerMode::OnFill));
        assert!(!fill.accepted_by(TriggerMode::OnEmpty));

        let empty = report(flags::EMPTY_THRESHOLD);
        assert!(!empty.accepted_by(TriggerMode::OnFill));
        assert!(empty.accepted_by(TriggerMode::OnEmpty));

        assert!(!report(flags::FULL).accepted_by(TriggerMode::OnFill));
    }

    #[test]
    fn flag_accessors() {
        let r = report(flags::OVERRUN | flags::LOSS | flags::EMPTY | flags::EMPTY_THRESHOLD);
        assert!(r.overrun());
        assert!(!r.underrun());
        assert!(r.loss());
        assert!(r.empty());
        assert!(r.empty_threshold());
    }
}
