//! Incremental framing of the serial byte stream
//!
//! Bytes arrive from the UART in arbitrary chunks. The framer buffers them
//! and hands out one complete, checksum-verified packet at a time. Damaged
//! input is reported once and skipped up to the next start code candidate,
//! so a single bad byte never stalls the link.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BytesMut};
use std::fmt;
use tracing::{trace, warn};

use crate::{
    checksum,
    command::Command,
    packet::{Packet, PacketType},
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

const START_HI: u8 = 0xEF;
const START_LO: u8 = 0x01;

/// Why a frame was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptReason {
    /// Bytes before the start code
    BadStartCode,

    /// Length field outside `2..=MAX_PAYLOAD_SIZE + 2`
    InvalidLength(u16),

    /// Checksum does not match the frame contents
    ChecksumMismatch { expected: u16, received: u16 },

    /// Packet type tag is not one of command / data / ack / end-of-data
    UnknownPacketType(u8),
}

/// A rejected frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorruptFrame {
    /// Why it was rejected
    pub reason: CorruptReason,

    /// Bytes dropped while resynchronising
    pub discarded: usize,
}

impl fmt::Display for CorruptFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            CorruptReason::BadStartCode => write!(f, "no start code")?,
            CorruptReason::InvalidLength(length) => write!(f, "invalid length {}", length)?,
            CorruptReason::ChecksumMismatch { expected, received } => write!(
                f,
                "checksum mismatch (expected 0x{:04X}, received 0x{:04X})",
                expected, received
            )?,
            CorruptReason::UnknownPacketType(kind) => write!(f, "unknown packet type 0x{:02X}", kind)?,
        }
        write!(f, ", {} bytes discarded", self.discarded)
    }
}

/// Result of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, verified packet
    Packet(Packet),

    /// Buffer holds no complete frame yet
    NeedMoreData,

    /// Damaged input was dropped
    Corrupt(CorruptFrame),
}

/// Receive-side frame assembler
///
/// # Examples
///
/// ```
/// use fpsense_core::{Command, Decoded, Framer};
///
/// let bytes = Framer::encode(&Command::gen_img(), 0xFFFF_FFFF);
///
/// let mut framer = Framer::new();
/// framer.push(&bytes[..5]);
/// assert_eq!(framer.decode(), Decoded::NeedMoreData);
///
/// framer.push(&bytes[5..]);
/// assert!(matches!(framer.decode(), Decoded::Packet(_)));
/// ```
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    /// Largest frame the module can send
    pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + Packet::CHECKSUM_SIZE;

    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(Self::MAX_FRAME_SIZE),
        }
    }

    /// Encode a command for `address`
    pub fn encode(command: &Command, address: u32) -> BytesMut {
        command.to_packet(address).encode()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        trace!("Framer <- {} bytes: {:02X?}", bytes.len(), &bytes[..bytes.len().min(32)]);
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes waiting to be framed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Try to take one frame from the front of the buffer
    pub fn decode(&mut self) -> Decoded {
        match self.buf.len() {
            0 => return Decoded::NeedMoreData,
            1 if self.buf[0] == START_HI => return Decoded::NeedMoreData,
            _ => {}
        }

        if self.buf[0] != START_HI || self.buf[1] != START_LO {
            return self.reject(CorruptReason::BadStartCode, 1);
        }

        if self.buf.len() < HEADER_SIZE {
            return Decoded::NeedMoreData;
        }

        let length = BigEndian::read_u16(&self.buf[7..9]);
        if usize::from(length) < Packet::CHECKSUM_SIZE
            || usize::from(length) > MAX_PAYLOAD_SIZE + Packet::CHECKSUM_SIZE
        {
            return self.reject(CorruptReason::InvalidLength(length), 2);
        }

        let total = HEADER_SIZE + usize::from(length);
        if self.buf.len() < total {
            return Decoded::NeedMoreData;
        }

        let type_raw = self.buf[6];
        let payload_end = total - Packet::CHECKSUM_SIZE;
        let expected = checksum::calculate(type_raw, length, &self.buf[HEADER_SIZE..payload_end]);
        let received = BigEndian::read_u16(&self.buf[payload_end..total]);
        if expected != received {
            return self.reject(CorruptReason::ChecksumMismatch { expected, received }, 2);
        }

        let packet_type = match PacketType::try_from(type_raw) {
            Ok(packet_type) => packet_type,
            Err(_) => return self.reject(CorruptReason::UnknownPacketType(type_raw), 2),
        };

        let mut frame = self.buf.split_to(total);
        let address = BigEndian::read_u32(&frame[2..6]);
        frame.truncate(payload_end);
        frame.advance(HEADER_SIZE);

        Decoded::Packet(Packet::with_payload(packet_type, address, frame.freeze()))
    }

    /// Drop bytes up to the next start code candidate at or after `from`
    fn reject(&mut self, reason: CorruptReason, from: usize) -> Decoded {
        let len = self.buf.len();
        let next = (from.min(len)..len)
            .find(|&i| self.buf[i] == START_HI && (i + 1 == len || self.buf[i + 1] == START_LO))
            .unwrap_or(len);

        self.buf.advance(next);

        let corrupt = CorruptFrame {
            reason,
            discarded: next,
        };
        warn!("Dropped corrupt frame: {}", corrupt);

        Decoded::Corrupt(corrupt)
    }
}
