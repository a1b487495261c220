//! VITA-49 frame codec for the VRLP radio family.
//!
//! The radios wrap a VITA-49.0 signal-data packet in one of three layouts,
//! selected per stream by a [`FrameProfile`]:
//!
//! - **Raw**: no header, the datagram is interleaved I/Q only.
//! - **Framed**: `VRLP` marker, frame word, VITA packet, `VEND` marker.
//! - **Lean**: the VITA packet alone, with five DDC context words between
//!   the timestamps and the payload.
//!
//! Every field is pulled out of a 32-bit word with explicit shifts and
//! masks, so decoding is independent of host endianness. Words are in
//! network order unless the profile is `byte_swapped`.
//!
//! This module also builds the transmit header/trailer template
//! ([`TxFrameTemplate`]) and complete packets for any profile
//! ([`encode_packet`]), which the tests and documentation use to
//! synthesize radio traffic.

use vrtlink_core::error::{CodecError, Error, Result};
use vrtlink_core::rate::DAC_RATE;
use vrtlink_core::types::{
    FRAMED_TAIL_SIZE, FrameProfile, IqSample, ProfileKind, TX_HEADER_SIZE,
};

/// Frame-alignment marker opening every Framed datagram (`"VRLP"`).
pub const FRAME_MARKER: u32 = 0x5652_4C50;

/// End marker closing every Framed datagram (`"VEND"`).
pub const END_MARKER: u32 = 0x5645_4E44;

/// Class-ID OUI used by this radio family.
pub const RADIO_OUI: u32 = 0x00FF_FFFA;

/// Information class code of transmit sample frames.
pub const TX_INFO_CLASS_CODE: u16 = 0x0013;

/// Packet class code of transmit sample frames.
pub const TX_PACKET_CLASS_CODE: u16 = 0x0000;

/// IF data packet with a stream identifier.
pub const PACKET_TYPE_IF_DATA: u8 = 1;

/// Extension data packet with a stream identifier.
pub const PACKET_TYPE_EXT_DATA: u8 = 3;

/// IF context packet (used for status reports).
pub const PACKET_TYPE_IF_CONTEXT: u8 = 4;

/// Integer timestamp type written by [`encode_packet`] (UTC seconds).
pub const TSI_UTC: u8 = 1;

/// Fractional timestamp type written by [`encode_packet`] (sample count).
pub const TSF_SAMPLE_COUNT: u8 = 1;

/// Number of DDC context words carried by Lean frames.
pub const CONTEXT_WORDS: usize = 5;

/// Frame counters wrap modulo `FRAME_COUNT_SPAN * samples_per_frame`.
const FRAME_COUNT_SPAN: usize = 4;

/// Largest frame count the 12-bit field can carry.
const FRAME_COUNT_MASK: u32 = 0x0FFF;

/// Largest frame size the 20-bit field can carry.
const FRAME_SIZE_MASK: u32 = 0x000F_FFFF;

// ---------------------------------------------------------------------------
// Header word
// ---------------------------------------------------------------------------

/// The packed VITA-49 header word.
///
/// Layout: `packet_type:4 (31..28) | C (27) | T (26) | TSI:2 (23..22) |
/// TSF:2 (21..20) | packet_count:4 (19..16) | packet_size:16 (15..0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VitaHeader {
    /// Packet type (1 and 3 carry a stream identifier).
    pub packet_type: u8,
    /// Class identifier present.
    pub has_class_id: bool,
    /// Trailer word present.
    pub has_trailer: bool,
    /// Integer timestamp type; 0 means absent.
    pub timestamp_int_type: u8,
    /// Fractional timestamp type; 0 means absent.
    pub timestamp_frac_type: u8,
    /// Rolling packet counter, modulo 16.
    pub packet_count: u8,
    /// Packet size in 32-bit words.
    pub packet_size: u16,
}

impl VitaHeader {
    /// Unpack a header word.
    pub fn from_word(w: u32) -> Self {
        VitaHeader {
            packet_type: ((w >> 28) & 0x0F) as u8,
            has_class_id: (w >> 27) & 1 == 1,
            has_trailer: (w >> 26) & 1 == 1,
            timestamp_int_type: ((w >> 22) & 0x03) as u8,
            timestamp_frac_type: ((w >> 20) & 0x03) as u8,
            packet_count: ((w >> 16) & 0x0F) as u8,
            packet_size: (w & 0xFFFF) as u16,
        }
    }

    /// Pack into a header word. Out-of-range fields are masked.
    pub fn to_word(&self) -> u32 {
        ((self.packet_type as u32 & 0x0F) << 28)
            | ((self.has_class_id as u32) << 27)
            | ((self.has_trailer as u32) << 26)
            | ((self.timestamp_int_type as u32 & 0x03) << 22)
            | ((self.timestamp_frac_type as u32 & 0x03) << 20)
            | ((self.packet_count as u32 & 0x0F) << 16)
            | self.packet_size as u32
    }

    /// Whether the packet type carries a stream identifier word.
    pub fn has_stream_id(&self) -> bool {
        matches!(self.packet_type, PACKET_TYPE_IF_DATA | PACKET_TYPE_EXT_DATA)
    }
}

/// VITA-49 class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    /// 24-bit organizationally unique identifier.
    pub oui: u32,
    /// Information class code.
    pub info_class_code: u16,
    /// Packet class code.
    pub pkt_class_code: u16,
}

impl ClassId {
    /// Class of transmit sample frames.
    pub const TX_SAMPLES: ClassId = ClassId {
        oui: RADIO_OUI,
        info_class_code: TX_INFO_CLASS_CODE,
        pkt_class_code: TX_PACKET_CLASS_CODE,
    };

    /// Unpack from its two words.
    pub fn from_words(w0: u32, w1: u32) -> Self {
        ClassId {
            oui: w0 & 0x00FF_FFFF,
            info_class_code: (w1 >> 16) as u16,
            pkt_class_code: (w1 & 0xFFFF) as u16,
        }
    }

    /// Pack into its two words.
    pub fn to_words(&self) -> [u32; 2] {
        [
            self.oui & 0x00FF_FFFF,
            ((self.info_class_code as u32) << 16) | self.pkt_class_code as u32,
        ]
    }
}

// ---------------------------------------------------------------------------
// Word access
// ---------------------------------------------------------------------------

/// Reads 32-bit words out of a datagram in the profile's byte order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Words<'a> {
    raw: &'a [u8],
    swapped: bool,
}

impl<'a> Words<'a> {
    pub(crate) fn new(raw: &'a [u8], swapped: bool) -> Self {
        Words { raw, swapped }
    }

    pub(crate) fn get(&self, index: usize) -> std::result::Result<u32, CodecError> {
        let offset = index * 4;
        let b = self
            .raw
            .get(offset..offset + 4)
            .ok_or(CodecError::ShortBuffer {
                needed: offset + 4,
                actual: self.raw.len(),
            })?;
        let bytes = [b[0], b[1], b[2], b[3]];
        Ok(if self.swapped {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn slice(&self, offset: usize, len: usize) -> std::result::Result<&'a [u8], CodecError> {
        self.raw
            .get(offset..offset + len)
            .ok_or(CodecError::ShortBuffer {
                needed: offset + len,
                actual: self.raw.len(),
            })
    }
}

pub(crate) fn put_word(out: &mut Vec<u8>, w: u32, swapped: bool) {
    if swapped {
        out.extend_from_slice(&w.to_le_bytes());
    } else {
        out.extend_from_slice(&w.to_be_bytes());
    }
}

fn read_word(bytes: &[u8], swapped: bool) -> u32 {
    let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if swapped {
        u32::from_le_bytes(b)
    } else {
        u32::from_be_bytes(b)
    }
}

/// Unpack interleaved I/Q words.
///
/// `payload.len()` must be a multiple of 4.
pub fn unpack_samples(payload: &[u8], byte_swapped: bool, iq_swapped: bool) -> Vec<IqSample> {
    payload
        .chunks_exact(4)
        .map(|chunk| {
            let w = read_word(chunk, byte_swapped);
            let hi = (w >> 16) as u16 as i16;
            let lo = (w & 0xFFFF) as u16 as i16;
            if iq_swapped {
                IqSample::new(lo, hi)
            } else {
                IqSample::new(hi, lo)
            }
        })
        .collect()
}

fn pack_sample(s: IqSample, iq_swapped: bool) -> u32 {
    let i = s.i as u16 as u32;
    let q = s.q as u16 as u32;
    if iq_swapped { (q << 16) | i } else { (i << 16) | q }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// A decoded frame.
///
/// For Raw frames every header field is zero or `None`. `samples.len()`
/// always equals `payload_size / 4` of the profile it was decoded with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    /// 12-bit frame counter from the Framed frame word.
    pub frame_count: u16,
    /// Frame size in words from the Framed frame word.
    pub frame_size: u32,
    /// VITA packet type.
    pub packet_type: u8,
    /// Class identifier present.
    pub has_class_id: bool,
    /// Trailer present.
    pub has_trailer: bool,
    /// Integer timestamp type (0 = absent).
    pub timestamp_int_type: u8,
    /// Fractional timestamp type (0 = absent).
    pub timestamp_frac_type: u8,
    /// Rolling packet counter, 0..15.
    pub packet_count: u8,
    /// VITA packet size in words.
    pub packet_size: u16,
    /// Stream identifier (0 when the packet type carries none).
    pub stream_id: u32,
    /// Class identifier.
    pub class_id: Option<ClassId>,
    /// Integer timestamp.
    pub timestamp_int: Option<u32>,
    /// Fractional timestamp, `(MSW << 32) | LSW`.
    pub timestamp_frac: Option<u64>,
    /// DDC context words (Lean only).
    pub context: Option<[u32; CONTEXT_WORDS]>,
    /// Trailer word.
    pub trailer: Option<u32>,
    /// Payload samples.
    pub samples: Vec<IqSample>,
}

impl DecodedPacket {
    /// The header fields as a [`VitaHeader`].
    pub fn vita_header(&self) -> VitaHeader {
        VitaHeader {
            packet_type: self.packet_type,
            has_class_id: self.has_class_id,
            has_trailer: self.has_trailer,
            timestamp_int_type: self.timestamp_int_type,
            timestamp_frac_type: self.timestamp_frac_type,
            packet_count: self.packet_count,
            packet_size: self.packet_size,
        }
    }
}

/// Decode one datagram under `profile`.
///
/// The buffer must hold at least `profile.frame_size()` bytes, and every
/// word the decoded header says is present. Bytes past the end of the
/// frame are ignored. Marker and OUI mismatches are logged, not rejected.
pub fn decode(profile: &FrameProfile, raw: &[u8]) -> std::result::Result<DecodedPacket, CodecError> {
    let needed = profile.frame_size();
    if raw.len() < needed {
        return Err(CodecError::ShortBuffer {
            needed,
            actual: raw.len(),
        });
    }

    let words = Words::new(raw, profile.byte_swapped);
    match profile.kind {
        ProfileKind::Raw => {
            let payload = words.slice(0, profile.payload_size)?;
            Ok(DecodedPacket {
                samples: unpack_samples(payload, profile.byte_swapped, profile.iq_swapped),
                ..Default::default()
            })
        }
        ProfileKind::Framed => {
            let marker = words.get(0)?;
            if marker != FRAME_MARKER {
                tracing::warn!(
                    marker = format_args!("{:#010x}", marker),
                    "Frame marker mismatch"
                );
            }
            let frame_word = words.get(1)?;
            let mut packet = decode_vita(profile, &words, 2, false)?;
            packet.frame_count = ((frame_word >> 20) & FRAME_COUNT_MASK) as u16;
            packet.frame_size = frame_word & FRAME_SIZE_MASK;
            Ok(packet)
        }
        ProfileKind::Lean => decode_vita(profile, &words, 0, true),
    }
}

fn decode_vita(
    profile: &FrameProfile,
    words: &Words<'_>,
    start: usize,
    lean: bool,
) -> std::result::Result<DecodedPacket, CodecError> {
    let mut idx = start;
    let header = VitaHeader::from_word(words.get(idx)?);
    idx += 1;

    let mut packet = DecodedPacket {
        packet_type: header.packet_type,
        has_class_id: header.has_class_id,
        has_trailer: header.has_trailer,
        timestamp_int_type: header.timestamp_int_type,
        timestamp_frac_type: header.timestamp_frac_type,
        packet_count: header.packet_count,
        packet_size: header.packet_size,
        ..Default::default()
    };

    // Lean frames always carry the stream identifier at word 1.
    if lean || header.has_stream_id() {
        packet.stream_id = words.get(idx)?;
        idx += 1;
    }

    if header.has_class_id {
        let class = ClassId::from_words(words.get(idx)?, words.get(idx + 1)?);
        if class.oui != RADIO_OUI {
            tracing::warn!(
                oui = format_args!("{:#08x}", class.oui),
                expected = format_args!("{:#08x}", RADIO_OUI),
                "Class OUI does not match radio family"
            );
        }
        packet.class_id = Some(class);
        idx += 2;
    }

    if header.timestamp_int_type != 0 {
        packet.timestamp_int = Some(words.get(idx)?);
        idx += 1;
    }

    if header.timestamp_frac_type != 0 {
        let msw = words.get(idx)? as u64;
        let lsw = words.get(idx + 1)? as u64;
        packet.timestamp_frac = Some((msw << 32) | lsw);
        idx += 2;
    }

    if lean {
        let mut context = [0u32; CONTEXT_WORDS];
        for (i, slot) in context.iter_mut().enumerate() {
            *slot = words.get(idx + i)?;
        }
        packet.context = Some(context);
        idx += CONTEXT_WORDS;
    }

    let payload = words.slice(idx * 4, profile.payload_size)?;
    packet.samples = unpack_samples(payload, profile.byte_swapped, profile.iq_swapped);
    idx += profile.payload_size / 4;

    if header.has_trailer {
        packet.trailer = Some(words.get(idx)?);
        idx += 1;
    }

    if profile.kind == ProfileKind::Framed {
        let end = words.get(idx)?;
        if end != END_MARKER {
            tracing::warn!(
                marker = format_args!("{:#010x}", end),
                "End marker mismatch"
            );
        }
    }

    Ok(packet)
}

/// Stateless codec bound to one stream's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    profile: FrameProfile,
}

impl FrameCodec {
    /// Create a codec for `profile`.
    pub fn new(profile: FrameProfile) -> Self {
        FrameCodec { profile }
    }

    /// The stream's profile.
    pub fn profile(&self) -> &FrameProfile {
        &self.profile
    }

    /// Decode one datagram.
    pub fn decode(&self, raw: &[u8]) -> std::result::Result<DecodedPacket, CodecError> {
        decode(&self.profile, raw)
    }

    /// Encode one packet.
    pub fn encode(&self, fields: &PacketFields, samples: &[IqSample]) -> Vec<u8> {
        encode_packet(&self.profile, fields, samples)
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Header contents for [`encode_packet`].
///
/// Presence follows the options: a `Some` timestamp sets its type field
/// ([`TSI_UTC`] / [`TSF_SAMPLE_COUNT`]), a `Some` trailer sets the T bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFields {
    /// Framed frame counter (12 bits).
    pub frame_count: u16,
    /// VITA packet type.
    pub packet_type: u8,
    /// Rolling packet counter (4 bits).
    pub packet_count: u8,
    /// Stream identifier, written when the packet type (or Lean layout)
    /// carries one.
    pub stream_id: u32,
    /// Class identifier.
    pub class_id: Option<ClassId>,
    /// Integer timestamp.
    pub timestamp_int: Option<u32>,
    /// Fractional timestamp.
    pub timestamp_frac: Option<u64>,
    /// Lean context words; zeros when `None`.
    pub context: Option<[u32; CONTEXT_WORDS]>,
    /// Trailer word.
    pub trailer: Option<u32>,
}

impl Default for PacketFields {
    fn default() -> Self {
        PacketFields {
            frame_count: 0,
            packet_type: PACKET_TYPE_IF_DATA,
            packet_count: 0,
            stream_id: 0,
            class_id: None,
            timestamp_int: None,
            timestamp_frac: None,
            context: None,
            trailer: None,
        }
    }
}

/// Build a complete datagram for `profile`.
///
/// The payload size is taken from `samples`; decode it with a profile
/// whose `payload_size` is `samples.len() * 4`.
pub fn encode_packet(profile: &FrameProfile, fields: &PacketFields, samples: &[IqSample]) -> Vec<u8> {
    let swapped = profile.byte_swapped;

    let mut body: Vec<u32> = Vec::new();
    let header = VitaHeader {
        packet_type: fields.packet_type,
        has_class_id: fields.class_id.is_some(),
        has_trailer: fields.trailer.is_some(),
        timestamp_int_type: if fields.timestamp_int.is_some() { TSI_UTC } else { 0 },
        timestamp_frac_type: if fields.timestamp_frac.is_some() {
            TSF_SAMPLE_COUNT
        } else {
            0
        },
        packet_count: fields.packet_count & 0x0F,
        packet_size: 0,
    };
    let lean = profile.kind == ProfileKind::Lean;

    if lean || header.has_stream_id() {
        body.push(fields.stream_id);
    }
    if let Some(class) = fields.class_id {
        body.extend_from_slice(&class.to_words());
    }
    if let Some(ts) = fields.timestamp_int {
        body.push(ts);
    }
    if let Some(ts) = fields.timestamp_frac {
        body.push((ts >> 32) as u32);
        body.push(ts as u32);
    }
    if lean {
        body.extend_from_slice(&fields.context.unwrap_or([0; CONTEXT_WORDS]));
    }
    body.extend(samples.iter().map(|&s| pack_sample(s, profile.iq_swapped)));
    if let Some(trailer) = fields.trailer {
        body.push(trailer);
    }

    let mut out = Vec::with_capacity((body.len() + 4) * 4);
    match profile.kind {
        ProfileKind::Raw => {
            for &s in samples {
                put_word(&mut out, pack_sample(s, profile.iq_swapped), swapped);
            }
        }
        ProfileKind::Framed => {
            let packet_words = body.len() + 1;
            let frame_words = packet_words + 3;
            let header = VitaHeader {
                packet_size: packet_words as u16,
                ..header
            };
            put_word(&mut out, FRAME_MARKER, swapped);
            put_word(&mut out, frame_word(fields.frame_count, frame_words), swapped);
            put_word(&mut out, header.to_word(), swapped);
            for &w in &body {
                put_word(&mut out, w, swapped);
            }
            put_word(&mut out, END_MARKER, swapped);
        }
        ProfileKind::Lean => {
            let header = VitaHeader {
                packet_size: (body.len() + 1) as u16,
                ..header
            };
            put_word(&mut out, header.to_word(), swapped);
            for &w in &body {
                put_word(&mut out, w, swapped);
            }
        }
    }
    out
}

fn frame_word(frame_count: u16, frame_words: usize) -> u32 {
    ((frame_count as u32 & FRAME_COUNT_MASK) << 20) | (frame_words as u32 & FRAME_SIZE_MASK)
}

// ---------------------------------------------------------------------------
// Transmit template
// ---------------------------------------------------------------------------

// Word indices within the transmit header.
const TX_FRAME_WORD: usize = 1;
const TX_VITA_WORD: usize = 2;
const TX_TSF_MSW: usize = 6;
const TX_TSF_LSW: usize = 7;

/// Fixed header and trailer for transmit frames, plus the counters and
/// timestamp that advance after every sent frame.
///
/// Header layout (8 words): `VRLP`, frame word, VITA header (type 1, C=1,
/// T=0, TSI=0, TSF=1), stream id, class id (2), fractional timestamp MSW
/// (whole seconds) and LSW (converter-clock ticks within the second). The
/// trailer is the `VEND` marker. The payload is never copied in.
#[derive(Debug, Clone)]
pub struct TxFrameTemplate {
    header: [u8; TX_HEADER_SIZE],
    trailer: [u8; FRAMED_TAIL_SIZE],
    byte_swapped: bool,
    samples_per_frame: usize,
    frame_count: u16,
    packet_count: u8,
    seconds: u32,
    ticks: u64,
    frac_increment: u64,
}

impl TxFrameTemplate {
    /// Build the template for `profile` (see [`FrameProfile::tx_framed`]).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the profile has no samples, has more
    /// than the 16-bit packet size can describe, or is not laid out as a
    /// transmit frame, or `sample_rate` is zero.
    pub fn new(profile: &FrameProfile, stream_id: u32, sample_rate: u32) -> Result<Self> {
        if profile.kind != ProfileKind::Framed
            || profile.header_size != TX_HEADER_SIZE
            || profile.tail_size != FRAMED_TAIL_SIZE
        {
            return Err(Error::InvalidParameter(
                "transmit frames require the tx_framed profile".into(),
            ));
        }
        let samples_per_frame = profile.samples_per_packet();
        if samples_per_frame == 0 {
            return Err(Error::InvalidParameter(
                "samples per frame must be nonzero".into(),
            ));
        }

        let swapped = profile.byte_swapped;
        let frame_words = profile.frame_size() / 4;
        let packet_words = u16::try_from(frame_words - 3).map_err(|_| {
            Error::InvalidParameter(format!(
                "{} samples per frame exceeds the VITA packet size field",
                samples_per_frame
            ))
        })?;
        let vita = VitaHeader {
            packet_type: PACKET_TYPE_IF_DATA,
            has_class_id: true,
            has_trailer: false,
            timestamp_int_type: 0,
            timestamp_frac_type: TSF_SAMPLE_COUNT,
            packet_count: 0,
            packet_size: packet_words,
        };
        let class = ClassId::TX_SAMPLES.to_words();

        let mut header = Vec::with_capacity(TX_HEADER_SIZE);
        put_word(&mut header, FRAME_MARKER, swapped);
        put_word(&mut header, frame_word(0, frame_words), swapped);
        put_word(&mut header, vita.to_word(), swapped);
        put_word(&mut header, stream_id, swapped);
        put_word(&mut header, class[0], swapped);
        put_word(&mut header, class[1], swapped);
        put_word(&mut header, 0, swapped);
        put_word(&mut header, 0, swapped);

        let mut trailer = Vec::with_capacity(FRAMED_TAIL_SIZE);
        put_word(&mut trailer, END_MARKER, swapped);

        let mut template = TxFrameTemplate {
            header: [0; TX_HEADER_SIZE],
            trailer: [0; FRAMED_TAIL_SIZE],
            byte_swapped: swapped,
            samples_per_frame,
            frame_count: 0,
            packet_count: 0,
            seconds: 0,
            ticks: 0,
            frac_increment: 0,
        };
        template.header.copy_from_slice(&header);
        template.trailer.copy_from_slice(&trailer);
        template.set_sample_rate(sample_rate)?;

        tracing::debug!(
            stream_id = format_args!("{:#010x}", stream_id),
            samples_per_frame,
            frame_words,
            frac_increment = template.frac_increment,
            "Transmit template built"
        );

        Ok(template)
    }

    /// Recompute the fractional-timestamp increment for a new rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(Error::InvalidParameter("sample rate must be nonzero".into()));
        }
        self.frac_increment = self.samples_per_frame as u64 * DAC_RATE / sample_rate as u64;
        Ok(())
    }

    /// Header bytes for the next frame.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Trailer bytes.
    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    /// Samples carried by each frame.
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Total datagram size in bytes.
    pub fn frame_bytes(&self) -> usize {
        TX_HEADER_SIZE + self.samples_per_frame * 4 + FRAMED_TAIL_SIZE
    }

    /// Frame counter of the next frame.
    pub fn frame_count(&self) -> u16 {
        self.frame_count
    }

    /// Packet counter of the next frame.
    pub fn packet_count(&self) -> u8 {
        self.packet_count
    }

    /// Whole seconds of the next frame's timestamp.
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Converter-clock ticks within the second of the next frame's
    /// timestamp.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks added per frame.
    pub fn frac_increment(&self) -> u64 {
        self.frac_increment
    }

    /// Step counters and timestamp past a frame that was sent in full.
    pub fn advance(&mut self) {
        let span = FRAME_COUNT_SPAN * self.samples_per_frame;
        self.frame_count =
            (((self.frame_count as usize + 1) % span) as u32 & FRAME_COUNT_MASK) as u16;
        self.packet_count = (self.packet_count + 1) % 16;

        self.ticks += self.frac_increment;
        if self.ticks >= DAC_RATE {
            self.seconds = self
                .seconds
                .wrapping_add((self.ticks / DAC_RATE) as u32);
            self.ticks %= DAC_RATE;
        }

        self.write_counters();
    }

    fn write_counters(&mut self) {
        let frame_words = self.frame_bytes() / 4;
        self.set_word(TX_FRAME_WORD, frame_word(self.frame_count, frame_words));

        let mut vita = VitaHeader::from_word(self.word(TX_VITA_WORD));
        vita.packet_count = self.packet_count;
        self.set_word(TX_VITA_WORD, vita.to_word());

        self.set_word(TX_TSF_MSW, self.seconds);
        self.set_word(TX_TSF_LSW, self.ticks as u32);
    }

    fn word(&self, index: usize) -> u32 {
        read_word(&self.header[index * 4..index * 4 + 4], self.byte_swapped)
    }

    fn set_word(&mut self, index: usize, w: u32) {
        let bytes = if self.byte_swapped {
            w.to_le_bytes()
        } else {
            w.to_be_bytes()
        };
        self.header[index * 4..index * 4 + 4].copy_from_slice(&bytes);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
