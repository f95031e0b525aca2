//! Module packet structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    error::{Error, Result},
    DEFAULT_ADDRESS, HEADER_SIZE, MAX_PAYLOAD_SIZE, START_CODE,
};

/// Packet type tag (the datasheet's "package identifier")
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Host to module instruction
    Command = 0x01,

    /// Data packet, follows a command or acknowledge packet
    Data = 0x02,

    /// Module reply carrying a confirmation code
    Ack = 0x07,

    /// Last data packet of a transfer
    EndOfData = 0x08,
}

impl PacketType {
    /// Get packet type name
    pub fn name(self) -> &'static str {
        match self {
            Self::Command => "COMMAND",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::EndOfData => "END_OF_DATA",
        }
    }
}

impl From<PacketType> for u8 {
    fn from(kind: PacketType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Data),
            0x07 => Ok(Self::Ack),
            0x08 => Ok(Self::EndOfData),
            _ => Err(Error::UnknownPacketType(value)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Module protocol packet
///
/// # Packet Structure
///
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬──────────────┬──────────┐
/// │  Start   │ Address  │   Type   │  Length  │   Payload    │ Checksum │
/// │ 2 bytes  │ 4 bytes  │  1 byte  │ 2 bytes  │ Length-2 B   │ 2 bytes  │
/// │ (0xEF01) │ (BE u32) │          │ (BE u16) │              │ (BE u16) │
/// └──────────┴──────────┴──────────┴──────────┴──────────────┴──────────┘
/// ```
///
/// All multi-byte values are big-endian. Length counts the payload plus the
/// two checksum bytes.
///
/// # Examples
///
/// ```
/// use fpsense_core::{Packet, PacketType};
///
/// let packet = Packet::with_payload(PacketType::Command, 0xFFFF_FFFF, vec![0x01]);
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(encoded).unwrap();
/// assert_eq!(packet, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Module address
    pub address: u32,

    /// Packet type tag
    pub packet_type: PacketType,

    /// Instruction / confirmation code followed by parameters or data
    pub payload: Bytes,
}

impl Packet {
    /// Header size in bytes (start code, address, type, length)
    pub const HEADER_SIZE: usize = HEADER_SIZE;

    /// Checksum size in bytes
    pub const CHECKSUM_SIZE: usize = 2;

    /// Maximum payload size
    pub const MAX_PAYLOAD_SIZE: usize = MAX_PAYLOAD_SIZE;

    /// Create a packet with empty payload for the default address
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            packet_type,
            payload: Bytes::new(),
        }
    }

    /// Create a packet with payload
    pub fn with_payload(packet_type: PacketType, address: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            packet_type,
            payload: payload.into(),
        }
    }

    /// Value of the length field for this packet
    pub fn length_field(&self) -> u16 {
        (self.payload.len() + Self::CHECKSUM_SIZE) as u16
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.packet_type.into(), self.length_field(), &self.payload)
    }

    /// Encode packet to bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use fpsense_core::{Packet, PacketType};
    ///
    /// let packet = Packet::with_payload(PacketType::Command, 0xFFFF_FFFF, vec![0x01]);
    /// assert_eq!(
    ///     &packet.encode()[..],
    ///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
    /// );
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u16(START_CODE);
        buf.put_u32(self.address);
        buf.put_u8(self.packet_type.into());
        buf.put_u16(self.length_field());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());

        buf
    }

    /// Decode one complete frame
    ///
    /// Trailing bytes after the declared length are ignored; use
    /// [`Framer`](crate::Framer) for stream input.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the header or the declared length
    /// - Start code, length or packet type is invalid
    /// - Checksum verification fails
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        if buf.len() < Self::HEADER_SIZE + Self::CHECKSUM_SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::HEADER_SIZE + Self::CHECKSUM_SIZE,
                actual: buf.len(),
            });
        }

        let start = buf.get_u16();
        if start != START_CODE {
            return Err(Error::BadStartCode(start));
        }

        let address = buf.get_u32();
        let type_raw = buf.get_u8();
        let length = buf.get_u16();

        if usize::from(length) < Self::CHECKSUM_SIZE
            || usize::from(length) > Self::MAX_PAYLOAD_SIZE + Self::CHECKSUM_SIZE
        {
            return Err(Error::InvalidLength(length));
        }

        if buf.len() < usize::from(length) {
            return Err(Error::PacketTooShort {
                expected: Self::HEADER_SIZE + usize::from(length),
                actual: Self::HEADER_SIZE + buf.len(),
            });
        }

        let payload_len = usize::from(length) - Self::CHECKSUM_SIZE;
        let payload = buf.split_to(payload_len).freeze();
        let checksum_received = buf.get_u16();

        let checksum_calculated = checksum::calculate(type_raw, length, &payload);
        if checksum_calculated != checksum_received {
            return Err(Error::ChecksumMismatch {
                expected: checksum_calculated,
                received: checksum_received,
            });
        }

        let packet_type = PacketType::try_from(type_raw)?;

        Ok(Self {
            address,
            packet_type,
            payload,
        })
    }

    /// Check if this is an acknowledge packet
    pub fn is_ack(&self) -> bool {
        self.packet_type == PacketType::Ack
    }

    /// Get total encoded size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + Self::CHECKSUM_SIZE
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("address", &format!("0x{:08X}", self.address))
            .field("packet_type", &self.packet_type)
            .field("checksum", &format!("0x{:04X}", self.checksum()))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{}](addr=0x{:08X}, len={})",
            self.packet_type,
            self.address,
            self.payload.len()
        )
    }
}
